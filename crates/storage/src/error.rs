//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode or decode audit event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be read back.
    #[error("corrupt audit row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
