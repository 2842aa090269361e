pub mod http;
pub mod sse;

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use thiserror::Error;

use crate::session::sources::Source;
use crate::session::types::TurnId;

/// One request to the answer backend. `turn` names the conversation turn
/// the answer streams into; the transport echoes it back on every event.
/// `new_topic` tells a stateful transport to drop any conversation
/// continuation it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRequest {
    pub question: String,
    pub turn: TurnId,
    pub new_topic: bool,
}

/// Ordered event sequence produced by one answer request. The core consumes
/// it in order and is agnostic to the transport underneath.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk {
        turn: TurnId,
        text: String,
    },
    Sources {
        sources: Vec<Source>,
    },
    EvalScores {
        turn: TurnId,
        scores: BTreeMap<String, f64>,
    },
    Done,
    /// Terminal failure reported in-band; transports fold their transport
    /// errors into this so the stream itself is infallible.
    Error {
        message: String,
    },
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to reach answer backend: {0}")]
    Connect(String),

    #[error("Answer stream failed: {0}")]
    Stream(String),

    #[error("Malformed stream payload: {0}")]
    MalformedEvent(String),
}

/// The search/ask transport. Implementations open a stream per request;
/// cancellation happens by dropping the stream, so no cancel method exists
/// on the trait.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn ask(&self, request: AnswerRequest) -> Result<EventStream, BackendError>;
}
