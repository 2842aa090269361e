pub mod action;
pub mod conversation;
pub mod effect;
pub mod reduce;
pub mod sources;
pub mod state;
pub mod store;
pub mod types;


pub use action::Action;
pub use conversation::{Conversation, Turn};
pub use effect::Effect;
pub use reduce::reduce;
pub use sources::{Source, SourceIcon, SourceMetadata, SourceRegistry};
pub use state::{ActiveRequest, SessionState, SessionStatus};
pub use store::{SessionHandle, SessionStore, StoreError};
pub use types::{Query, RequestId, SourceName, TurnId};
