use crate::session::types::{RequestId, TurnId};

/// Side effects the reducer asks the store actor to carry out. The reducer
/// itself never performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a backend stream for this request, feeding the named turn.
    /// `new_topic` tells the transport to drop any conversation
    /// continuation it holds.
    StartRequest {
        request_id: RequestId,
        turn: TurnId,
        question: String,
        new_topic: bool,
    },

    /// Signal cooperative cancellation to a superseded or aborted request.
    /// The backend may keep producing; its events will fail the identity
    /// check and be dropped.
    CancelRequest { request_id: RequestId },
}

impl Effect {
    pub fn request_id(&self) -> RequestId {
        match self {
            Effect::StartRequest { request_id, .. } | Effect::CancelRequest { request_id } => {
                *request_id
            }
        }
    }
}
