//! Configuration loading from capgate.toml.

use authority::AuthorityConfig;
use policy::Policy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TTL, purge cadence and issuance throttle.
    pub authority: AuthorityConfig,

    /// Attribute rules for issuance.
    pub policy: Policy,

    pub audit: AuditConfig,

    pub log: LogConfig,
}

/// Where the audit trail is written.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config
            .authority
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config
            .policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
