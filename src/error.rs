use thiserror::Error;

/// Errors surfaced by the storage core.
///
/// `TransactionAborted` is special: the caller is expected to respond by
/// aborting the transaction (`Transaction::abort`), which releases its
/// locks and discards its dirty pages. Nothing else does that cleanup.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("transaction aborted")]
    TransactionAborted,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn storage(msg: impl Into<String>) -> Self {
        DbError::Storage(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        DbError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DbError::NotFound(msg.into())
    }
}
