use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use finsight_core::backend::{
    AnswerBackend, AnswerRequest, BackendError, EventStream, StreamEvent,
};

/// Backend whose streams are driven by the test, one scripted channel per
/// expected request. Opening a request without a script fails the way a
/// dead server would.
#[derive(Default)]
pub struct ChannelBackend {
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<StreamEvent>>>,
    requests: Mutex<Vec<AnswerRequest>>,
}

impl ChannelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a stream for the next request and returns its driving end.
    pub fn script(&self) -> mpsc::UnboundedSender<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(rx);
        tx
    }

    pub fn seen_requests(&self) -> Vec<AnswerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerBackend for ChannelBackend {
    async fn ask(&self, request: AnswerRequest) -> Result<EventStream, BackendError> {
        self.requests.lock().unwrap().push(request);
        match self.streams.lock().unwrap().pop_front() {
            Some(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => Err(BackendError::Connect("connection refused".to_string())),
        }
    }
}
