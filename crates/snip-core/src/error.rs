use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid owner id: {0}")]
    InvalidOwnerId(String),
}

/// Errors surfaced by the store contract.
///
/// `Conflict` and `AlreadyDeleted` are expected outcomes rather than faults:
/// callers branch on them to answer idempotently. Every other variant is a
/// backend fault and is never retried by the store itself.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("original url already shortened as {code}")]
    Conflict { code: String },
    #[error("url {0} has already been deleted")]
    AlreadyDeleted(String),
    #[error("original url appears more than once in batch: {0}")]
    DuplicateInBatch(String),
    #[error("batch stored {actual} of {expected} records, rolled back")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("owner id is required by this backend")]
    MissingOwner,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
}

impl StorageError {
    /// Returns the existing short code when this is a conflict.
    pub fn conflict_code(&self) -> Option<&str> {
        match self {
            StorageError::Conflict { code } => Some(code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
