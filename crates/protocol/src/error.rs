//! Protocol error types.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("response writer stopped: {0}")]
    Writer(String),
}

pub type Result<T> = std::result::Result<T, Error>;
