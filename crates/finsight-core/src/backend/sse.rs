//! Wire format of the answer API: server-sent events whose data lines are
//! either plain answer chunks or inline-tagged control payloads.

use std::collections::BTreeMap;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::bytes::Bytes;

use crate::backend::BackendError;
use crate::session::sources::{Source, SourceIcon, SourceMetadata};
use crate::session::types::SourceName;

pub const SESSION_ID_TAG: &str = "[SESSION_ID]";
pub const SOURCE_TAG: &str = "[SOURCE]";
pub const EVAL_TAG: &str = "[EVAL]";
pub const DONE_TAG: &str = "[DONE]";

/// One decoded data line.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// Server-assigned chat session id; later requests send it back for
    /// conversation continuity.
    SessionId(String),
    Source(Box<Source>),
    EvalScores(BTreeMap<String, f64>),
    Done,
    Chunk(String),
}

/// Shape of a `[SOURCE]` JSON payload: the retrieved document's metadata
/// with its passage attached.
#[derive(Debug, Deserialize)]
struct SourcePayload {
    name: String,
    #[serde(default, alias = "category")]
    icon: Option<SourceIcon>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    page_content: Option<String>,
}

impl From<SourcePayload> for Source {
    fn from(payload: SourcePayload) -> Self {
        Source {
            name: SourceName::new(payload.name),
            icon: payload.icon.unwrap_or_default(),
            expanded: false,
            metadata: SourceMetadata {
                title: payload.title,
                summary: payload.summary,
                url: payload.url,
                page_content: payload.page_content,
            },
        }
    }
}

/// Decodes one SSE data line. Anything that is not a recognized tag is an
/// answer chunk verbatim.
pub fn decode_data(data: &str) -> Result<WireEvent, BackendError> {
    if let Some(rest) = data.strip_prefix(SESSION_ID_TAG) {
        return Ok(WireEvent::SessionId(rest.trim().to_string()));
    }
    if let Some(rest) = data.strip_prefix(SOURCE_TAG) {
        let payload: SourcePayload = serde_json::from_str(rest.trim())
            .map_err(|e| BackendError::MalformedEvent(format!("bad source payload: {e}")))?;
        return Ok(WireEvent::Source(Box::new(payload.into())));
    }
    if let Some(rest) = data.strip_prefix(EVAL_TAG) {
        let scores: BTreeMap<String, f64> = serde_json::from_str(rest.trim())
            .map_err(|e| BackendError::MalformedEvent(format!("bad eval payload: {e}")))?;
        return Ok(WireEvent::EvalScores(scores));
    }
    if data.trim() == DONE_TAG {
        return Ok(WireEvent::Done);
    }
    Ok(WireEvent::Chunk(data.to_string()))
}

pub type WireStream = Pin<Box<dyn Stream<Item = Result<WireEvent, BackendError>> + Send>>;

/// Parses a byte stream of server-sent events into decoded wire events.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> WireStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let events = byte_stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())))
        .eventsource()
        .map(|result| match result {
            Ok(event) => decode_data(&event.data),
            Err(e) => Err(BackendError::Stream(e.to_string())),
        });

    Box::pin(events)
}
