use thiserror::Error;

use crate::backend::BackendError;
use crate::session::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}
