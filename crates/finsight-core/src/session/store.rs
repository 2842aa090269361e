use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::backend::{AnswerBackend, AnswerRequest, StreamEvent};
use crate::session::action::Action;
use crate::session::effect::Effect;
use crate::session::reduce::reduce;
use crate::session::state::SessionState;
use crate::session::types::{Query, RequestId, SourceName, TurnId};

const INTENT_CHANNEL_SIZE: usize = 64;
const STREAM_CHANNEL_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Session store shut down")]
    Closed,
}

/// One dispatched intent, acknowledged once the actor has applied it so
/// that a caller's next snapshot already reflects it.
struct IntentCmd {
    action: Action,
    done: oneshot::Sender<()>,
}

/// The session store: one spawned actor owning the [`SessionState`] and
/// serializing every mutation through [`reduce`]. Consumers hold a
/// [`SessionHandle`].
pub struct SessionStore;

impl SessionStore {
    /// Spawns the store actor task and returns its handle. The actor lives
    /// until every handle is dropped.
    pub fn spawn(backend: Arc<dyn AnswerBackend>) -> SessionHandle {
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_SIZE);
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_SIZE);
        let (state_tx, state_rx) = watch::channel(SessionState::new());

        let actor = StoreActor {
            state: SessionState::new(),
            backend,
            state_tx,
            stream_tx,
            tokens: HashMap::new(),
        };
        tokio::spawn(actor.run(intent_rx, stream_rx));

        SessionHandle {
            intent_tx,
            state_rx,
        }
    }
}

/// Cloneable front door to the store actor. Each intent is acknowledged
/// after the actor applies it, so a subsequent [`SessionHandle::snapshot`]
/// already reflects the dispatch. Outcomes are observed through the state
/// projection, not return values.
#[derive(Clone)]
pub struct SessionHandle {
    intent_tx: mpsc::Sender<IntentCmd>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Starts a new topic. Rejects queries that are empty after trimming
    /// before any state changes.
    pub async fn search(&self, query: &str) -> Result<(), StoreError> {
        let query = Query::new(query).ok_or(StoreError::EmptyQuery)?;
        self.dispatch(Action::Search {
            query,
            request_id: RequestId::new(),
        })
        .await
    }

    /// Asks a follow-up question within the current topic.
    pub async fn ask(&self, query: &str) -> Result<(), StoreError> {
        let query = Query::new(query).ok_or(StoreError::EmptyQuery)?;
        self.dispatch(Action::Ask {
            query,
            request_id: RequestId::new(),
        })
        .await
    }

    /// Cancels the in-flight request, if any. Partial answers stay visible.
    pub async fn abort(&self) -> Result<(), StoreError> {
        self.dispatch(Action::Abort).await
    }

    /// Flips a source's expansion state, or sets it when `expanded` is
    /// given. Unknown names are ignored.
    pub async fn toggle_source(
        &self,
        name: impl Into<SourceName>,
        expanded: Option<bool>,
    ) -> Result<(), StoreError> {
        self.dispatch(Action::ToggleSource {
            name: name.into(),
            expanded,
        })
        .await
    }

    /// The current session state, cloned.
    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// A watch receiver republished on every state change; suitable for
    /// re-rendering loops and for `wait_for` in tests.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    async fn dispatch(&self, action: Action) -> Result<(), StoreError> {
        let (done, acked) = oneshot::channel();
        self.intent_tx
            .send(IntentCmd { action, done })
            .await
            .map_err(|_| StoreError::Closed)?;
        acked.await.map_err(|_| StoreError::Closed)
    }
}

struct StoreActor {
    state: SessionState,
    backend: Arc<dyn AnswerBackend>,
    state_tx: watch::Sender<SessionState>,
    /// Feedback channel: stream pumps send their events back here as
    /// actions tagged with the owning request id.
    stream_tx: mpsc::Sender<Action>,
    tokens: HashMap<RequestId, CancellationToken>,
}

impl StoreActor {
    async fn run(
        mut self,
        mut intent_rx: mpsc::Receiver<IntentCmd>,
        mut stream_rx: mpsc::Receiver<Action>,
    ) {
        loop {
            tokio::select! {
                // Stream events first so a pending Done settles state
                // before the next intent supersedes it.
                biased;

                Some(action) = stream_rx.recv() => self.step(action),
                cmd = intent_rx.recv() => match cmd {
                    Some(IntentCmd { action, done }) => {
                        self.step(action);
                        let _ = done.send(());
                    }
                    // Every handle dropped: cancel whatever is in flight
                    // and wind down.
                    None => break,
                },
            }
        }
        for token in self.tokens.values() {
            token.cancel();
        }
    }

    /// One dispatch: reduce, republish, interpret effects. Everything in
    /// here is synchronous, so no two mutations interleave.
    fn step(&mut self, action: Action) {
        if action.is_terminal()
            && let Some(request_id) = action.stream_request_id()
        {
            self.tokens.remove(&request_id);
        }

        let effects = reduce(&mut self.state, action);
        let _ = self.state_tx.send(self.state.clone());

        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::CancelRequest { request_id } => {
                if let Some(token) = self.tokens.remove(&request_id) {
                    token.cancel();
                }
            }
            Effect::StartRequest {
                request_id,
                turn,
                question,
                new_topic,
            } => {
                let token = CancellationToken::new();
                self.tokens.insert(request_id, token.clone());
                tokio::spawn(pump_request(
                    self.backend.clone(),
                    self.stream_tx.clone(),
                    request_id,
                    turn,
                    question,
                    new_topic,
                    token,
                ));
            }
        }
    }
}

/// Opens the backend stream for one request and forwards its events to the
/// actor until the stream ends or the token cancels. Cancellation is
/// cooperative: the pump stops forwarding, the backend may keep producing.
async fn pump_request(
    backend: Arc<dyn AnswerBackend>,
    stream_tx: mpsc::Sender<Action>,
    request_id: RequestId,
    turn: TurnId,
    question: String,
    new_topic: bool,
    token: CancellationToken,
) {
    let request = AnswerRequest {
        question,
        turn,
        new_topic,
    };
    let open = tokio::select! {
        () = token.cancelled() => return,
        open = backend.ask(request) => open,
    };
    let mut stream = match open {
        Ok(stream) => stream,
        Err(err) => {
            let _ = stream_tx
                .send(Action::StreamFailed {
                    request_id,
                    message: err.to_string(),
                })
                .await;
            return;
        }
    };

    loop {
        let event = tokio::select! {
            () = token.cancelled() => {
                tracing::debug!(request = %request_id, "stream pump cancelled");
                return;
            }
            event = stream.next() => event,
        };
        let action = match event {
            Some(StreamEvent::Chunk { turn, text }) => Action::StreamChunk {
                request_id,
                turn,
                text,
            },
            Some(StreamEvent::Sources { sources }) => Action::StreamSources {
                request_id,
                sources,
            },
            Some(StreamEvent::EvalScores { turn, scores }) => Action::StreamEvalScores {
                request_id,
                turn,
                scores,
            },
            Some(StreamEvent::Done) => Action::StreamDone { request_id },
            Some(StreamEvent::Error { message }) => Action::StreamFailed {
                request_id,
                message,
            },
            // Stream ended without a done marker: malformed, not complete.
            None => Action::StreamFailed {
                request_id,
                message: "answer stream ended unexpectedly".to_string(),
            },
        };
        let terminal = action.is_terminal();
        if stream_tx.send(action).await.is_err() || terminal {
            return;
        }
    }
}
