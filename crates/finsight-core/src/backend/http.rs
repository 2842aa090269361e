use std::sync::{Arc, Mutex};

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use url::Url;

use crate::backend::sse::{self, WireEvent};
use crate::backend::{AnswerBackend, AnswerRequest, BackendError, EventStream, StreamEvent};

/// Streaming HTTP transport for the answer API: POST `/api/chat` with the
/// question, consume the SSE response. Conversation continuity rides on the
/// server-assigned session id captured from the first exchange; a new topic
/// drops it.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    continuation: Arc<Mutex<Option<String>>>,
}

impl HttpBackend {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            continuation: Arc::new(Mutex::new(None)),
        }
    }

    fn chat_url(&self, session_id: Option<&str>) -> Result<Url, BackendError> {
        let mut url = self
            .base_url
            .join("api/chat")
            .map_err(|e| BackendError::Connect(format!("bad backend url: {e}")))?;
        if let Some(id) = session_id {
            url.query_pairs_mut().append_pair("session_id", id);
        }
        Ok(url)
    }

    fn stored_session(&self) -> Option<String> {
        self.continuation
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn clear_session(&self) {
        self.continuation
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

#[async_trait]
impl AnswerBackend for HttpBackend {
    async fn ask(&self, request: AnswerRequest) -> Result<EventStream, BackendError> {
        if request.new_topic {
            self.clear_session();
        }
        let url = self.chat_url(self.stored_session().as_deref())?;

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "question": request.question }))
            .send()
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?
            .error_for_status()
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        let mut wire = sse::parse_sse_stream(response.bytes_stream());
        let turn = request.turn;
        let continuation = Arc::clone(&self.continuation);

        let events = stream! {
            while let Some(item) = wire.next().await {
                match item {
                    Ok(WireEvent::SessionId(id)) => {
                        tracing::debug!(session = %id, "chat session id assigned");
                        continuation
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .replace(id);
                    }
                    Ok(WireEvent::Chunk(text)) => yield StreamEvent::Chunk { turn, text },
                    Ok(WireEvent::Source(source)) => {
                        yield StreamEvent::Sources { sources: vec![*source] };
                    }
                    Ok(WireEvent::EvalScores(scores)) => {
                        yield StreamEvent::EvalScores { turn, scores };
                    }
                    Ok(WireEvent::Done) => {
                        yield StreamEvent::Done;
                        return;
                    }
                    Err(err) => {
                        yield StreamEvent::Error { message: err.to_string() };
                        return;
                    }
                }
            }
            yield StreamEvent::Error {
                message: "answer stream ended without done marker".to_string(),
            };
        };
        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new(Url::parse("http://localhost:5000/").unwrap())
    }

    #[test]
    fn chat_url_without_session() {
        let url = backend().chat_url(None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/chat");
    }

    #[test]
    fn chat_url_carries_session_id() {
        let url = backend().chat_url(Some("abc 1")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/chat?session_id=abc+1"
        );
    }

    #[test]
    fn new_topic_drops_the_stored_session() {
        let backend = backend();
        backend
            .continuation
            .lock()
            .unwrap()
            .replace("stale".to_string());

        backend.clear_session();
        assert!(backend.stored_session().is_none());
    }
}
