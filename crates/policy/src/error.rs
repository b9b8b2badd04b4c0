//! Policy error types.

use thiserror::Error;

/// Errors from loading policy or parsing its attributes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A role string did not name a known role.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// The policy configuration is invalid.
    #[error("invalid policy: {0}")]
    Invalid(String),

    /// Failed to parse a policy file.
    #[error("failed to parse policy: {0}")]
    Parse(String),

    #[error("failed to read policy: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
