// Session core for the Finsight answer assistant, without UI dependencies.

pub mod backend;
pub mod error;
pub mod session;

pub use error::{Error, Result};
