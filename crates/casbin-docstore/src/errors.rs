use casbin::error::AdapterError;
use docstore::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocStoreError {
    /// Model text failed to parse; raised before anything is written.
    #[error("invalid model: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DocStoreResult<T> = Result<T, DocStoreError>;

impl From<DocStoreError> for casbin::Error {
    fn from(err: DocStoreError) -> Self {
        casbin::Error::from(AdapterError(Box::new(err)))
    }
}
