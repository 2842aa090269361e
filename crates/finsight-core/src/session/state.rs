use serde::{Deserialize, Serialize};

use crate::session::conversation::Conversation;
use crate::session::sources::SourceRegistry;
use crate::session::types::{RequestId, TurnId};

/// Single source of truth for what the UI may do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Searching,
    Streaming,
    Error,
}

/// Handle to the one outstanding backend request and the turn its stream
/// feeds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRequest {
    pub id: RequestId,
    pub turn: TurnId,
}

/// Root aggregate for one session. Owned exclusively by the store actor;
/// consumers only ever see clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub conversation: Conversation,
    pub sources: SourceRegistry,
    /// Present iff `status` is Searching or Streaming. At most one request
    /// is outstanding; a new search/ask supersedes, never queues.
    pub active_request: Option<ActiveRequest>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            conversation: Conversation::new(),
            sources: SourceRegistry::new(),
            active_request: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Searching | SessionStatus::Streaming
        )
    }

    /// True when the given request id is the one currently streaming.
    /// Stream events failing this check are stale and must be dropped.
    pub fn request_matches(&self, id: RequestId) -> bool {
        self.active_request.is_some_and(|active| active.id == id)
    }

    pub fn begin_request(&mut self, id: RequestId, turn: TurnId) {
        self.status = SessionStatus::Searching;
        self.active_request = Some(ActiveRequest { id, turn });
    }

    /// Releases the request handle without touching the conversation.
    pub fn release_request(&mut self, status: SessionStatus) {
        self.status = status;
        self.active_request = None;
    }
}
