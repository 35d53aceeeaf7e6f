use snip_core::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("link is gone: {0}")]
    Gone(String),
    #[error("caller is not identified")]
    Unauthorized,
    #[error("storage error: {0}")]
    Storage(StorageError),
    #[error(transparent)]
    Deletion(#[from] DeletionError),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::AlreadyDeleted(key) => Self::Gone(key),
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeletionError {
    #[error("deletion pipeline is shut down")]
    Closed,
}
