//! Authority configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest TTL a capability may be given.
pub const MAX_TTL_SECS: u64 = 24 * 60 * 60;

/// Tunables for issuance and reclamation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Lifetime of a minted capability.
    pub ttl_secs: u64,

    /// How often a long-running server drops expired records. 0 disables.
    pub purge_interval_secs: u64,

    /// Per-user issuance throttle.
    pub rate_limit: RateLimitConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            purge_interval_secs: 60,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Sliding-window limit on issuance requests per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 3,
            window_secs: 30,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("ttl_secs must be between 1 and 86400, got {0}")]
    Ttl(u64),

    #[error("rate_limit.max_requests must be greater than zero")]
    ZeroRateLimit,

    #[error("rate_limit.window_secs must be between 1 and 86400, got {0}")]
    Window(u64),
}

impl AuthorityConfig {
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TTL_SECS).contains(&self.ttl_secs) {
            return Err(ConfigError::Ttl(self.ttl_secs));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.max_requests == 0 {
                return Err(ConfigError::ZeroRateLimit);
            }
            if !(1..=MAX_TTL_SECS).contains(&self.rate_limit.window_secs) {
                return Err(ConfigError::Window(self.rate_limit.window_secs));
            }
        }
        Ok(())
    }

    /// Capability lifetime. Only meaningful after [`validate`](Self::validate).
    pub fn ttl(&self) -> Duration {
        seconds(self.ttl_secs)
    }

    pub(crate) fn rate_window(&self) -> Duration {
        seconds(self.rate_limit.window_secs)
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs.min(MAX_TTL_SECS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(Duration::zero)
}
