use std::collections::BTreeMap;

use crate::session::sources::Source;
use crate::session::types::{Query, RequestId, SourceName, TurnId};

/// Everything that can mutate session state, in one flat enum: intents
/// dispatched by the presentation layer, and events pumped back from an
/// in-flight answer stream. Stream-originated actions carry the id of the
/// request that produced them so the reducer can drop stale ones.
#[derive(Debug, Clone)]
pub enum Action {
    /// New topic: resets the conversation and source set, then opens a
    /// request that streams into the summary turn.
    Search {
        query: Query,
        request_id: RequestId,
    },

    /// Follow-up: appends a human/assistant turn pair and streams into the
    /// assistant turn. Never touches the summary or replaces sources.
    Ask {
        query: Query,
        request_id: RequestId,
    },

    /// Cancels the outstanding request, if any. Partial content stays.
    Abort,

    /// Flips (or sets) a source's expansion state. Unknown names are a
    /// no-op.
    ToggleSource {
        name: SourceName,
        expanded: Option<bool>,
    },

    StreamChunk {
        request_id: RequestId,
        turn: TurnId,
        text: String,
    },

    StreamSources {
        request_id: RequestId,
        sources: Vec<Source>,
    },

    StreamEvalScores {
        request_id: RequestId,
        turn: TurnId,
        scores: BTreeMap<String, f64>,
    },

    StreamDone {
        request_id: RequestId,
    },

    StreamFailed {
        request_id: RequestId,
        message: String,
    },
}

impl Action {
    /// The owning request for stream-originated actions; `None` for intents.
    pub fn stream_request_id(&self) -> Option<RequestId> {
        match self {
            Action::StreamChunk { request_id, .. }
            | Action::StreamSources { request_id, .. }
            | Action::StreamEvalScores { request_id, .. }
            | Action::StreamDone { request_id }
            | Action::StreamFailed { request_id, .. } => Some(*request_id),
            Action::Search { .. }
            | Action::Ask { .. }
            | Action::Abort
            | Action::ToggleSource { .. } => None,
        }
    }

    /// True for actions that end the request they belong to.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Action::StreamDone { .. } | Action::StreamFailed { .. }
        )
    }
}
