//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Everything that can stop `capgate` before or while it runs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The audit database does not exist.
    ///
    /// This typically means the server has never run.
    #[error("audit log not found at {path}. Run 'capgate serve' first")]
    AuditNotFound { path: PathBuf },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The authority rejected its configuration.
    #[error("config error: {0}")]
    Authority(#[from] authority::ConfigError),

    /// An error occurred in the protocol layer.
    #[error(transparent)]
    Protocol(#[from] protocol::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
