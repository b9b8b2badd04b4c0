//! The capability authorization service.

use crate::{ActionHandler, AuthorityConfig, Clock, ConfigError, PlaceCallback, SystemClock};
use crate::rate_limit::RateLimiter;
use chrono::{DateTime, Duration, Utc};
use policy::{ActionType, Policy};
use std::collections::HashMap;
use std::sync::Arc;
use storage::{AuditEvent, AuditKind, AuditLog, CapabilityId, CapabilityRecord, CapabilityStore};

/// Issues capabilities behind a policy check and enforces them on use.
///
/// Shareable across threads; wrap it in an `Arc` and hand it to every
/// request handler.
pub struct Authority {
    pub(crate) policy: Policy,
    pub(crate) store: CapabilityStore,
    pub(crate) ttl: Duration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) limiter: Option<RateLimiter>,
    pub(crate) handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
    audit: Option<AuditLog>,
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("policy", &self.policy)
            .field("ttl", &self.ttl)
            .field("records", &self.store.len())
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Authority {
    /// An authority with the wall clock, no audit log, and the callback
    /// handler registered.
    pub fn new(policy: Policy, config: AuthorityConfig) -> Result<Self, ConfigError> {
        Self::builder(policy).config(config).handler(PlaceCallback).build()
    }

    pub fn builder(policy: Policy) -> AuthorityBuilder {
        AuthorityBuilder {
            policy,
            config: AuthorityConfig::default(),
            clock: Arc::new(SystemClock),
            handlers: HashMap::new(),
            audit: None,
        }
    }

    /// Current view of a capability, with lazy expiry applied.
    pub fn capability(&self, id: &CapabilityId) -> Option<CapabilityRecord> {
        self.store.get(id, self.clock.now())
    }

    /// Drop records whose expiry has passed, and forget rate-limit state for
    /// users idle for a whole window. Returns the number of records dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let purged = self.store.purge_expired(now);
        if purged > 0 {
            tracing::debug!(purged, "purged expired capabilities");
        }
        if let Some(limiter) = &self.limiter {
            let idle = limiter.purge(now);
            if idle > 0 {
                tracing::debug!(idle, "forgot idle rate-limit buckets");
            }
        }
        purged
    }

    /// Number of records currently held.
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn audit_log(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    /// Append to the audit log, if any. Failures are logged, never raised.
    pub(crate) fn audit(&self, at: DateTime<Utc>, kind: AuditKind) {
        let Some(log) = &self.audit else {
            return;
        };
        if let Err(e) = log.append(&AuditEvent::new(at, kind)) {
            tracing::warn!(error = %e, "failed to append audit event");
        }
    }
}

/// Builder for [`Authority`].
pub struct AuthorityBuilder {
    policy: Policy,
    config: AuthorityConfig,
    clock: Arc<dyn Clock>,
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
    audit: Option<AuditLog>,
}

impl AuthorityBuilder {
    pub fn config(mut self, config: AuthorityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a handler; a later handler for the same action type wins.
    pub fn handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.handlers.insert(handler.action_type(), Arc::new(handler));
        self
    }

    pub fn audit(mut self, log: AuditLog) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn build(self) -> Result<Authority, ConfigError> {
        self.config.validate()?;

        let limiter = self
            .config
            .rate_limit
            .enabled
            .then(|| RateLimiter::new(self.config.rate_limit.max_requests, self.config.rate_window()));

        Ok(Authority {
            policy: self.policy,
            store: CapabilityStore::new(),
            ttl: self.config.ttl(),
            clock: self.clock,
            limiter,
            handlers: self.handlers,
            audit: self.audit,
        })
    }
}
