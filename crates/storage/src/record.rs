//! Capability records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque capability identifier; doubles as the bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    pub fn new() -> Self {
        Self(format!("cap-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CapabilityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CapabilityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of a capability.
///
/// `Issued` is the only initial state; `Consumed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityState {
    Issued,
    Consumed,
    Expired,
}

impl CapabilityState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CapabilityState::Issued)
    }
}

/// Attributes a new capability is bound to.
#[derive(Debug, Clone)]
pub struct NewCapability {
    pub action_type: String,
    pub client_id: String,
    pub phone: String,
    pub issuer: String,
    pub source_module: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A minted capability.
///
/// Bound attributes are fixed at creation. The state only moves forward, and
/// only through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRecord {
    id: CapabilityId,
    action_type: String,
    bound_client_id: String,
    bound_phone: String,
    issuer: String,
    source_module: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    state: CapabilityState,
    consumed_at: Option<DateTime<Utc>>,
    consumed_by: Option<String>,
}

impl CapabilityRecord {
    pub(crate) fn issue(id: CapabilityId, new: NewCapability) -> Self {
        Self {
            id,
            action_type: new.action_type,
            bound_client_id: new.client_id,
            bound_phone: new.phone,
            issuer: new.issuer,
            source_module: new.source_module,
            issued_at: new.issued_at,
            expires_at: new.expires_at,
            state: CapabilityState::Issued,
            consumed_at: None,
            consumed_by: None,
        }
    }

    pub fn id(&self) -> &CapabilityId {
        &self.id
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn bound_client_id(&self) -> &str {
        &self.bound_client_id
    }

    pub fn bound_phone(&self) -> &str {
        &self.bound_phone
    }

    /// User id of the subject the capability was issued to.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn state(&self) -> CapabilityState {
        self.state
    }

    pub fn consumed_at(&self) -> Option<DateTime<Utc>> {
        self.consumed_at
    }

    pub fn consumed_by(&self) -> Option<&str> {
        self.consumed_by.as_deref()
    }

    /// Whether `now` is past the expiry instant.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Mark `Issued -> Expired` if `now` is past expiry. Returns the state
    /// observed afterwards.
    pub(crate) fn expire_if_due(&mut self, now: DateTime<Utc>) -> CapabilityState {
        if self.state == CapabilityState::Issued && self.is_past_expiry(now) {
            self.state = CapabilityState::Expired;
        }
        self.state
    }

    /// `Issued -> Consumed`. Callers hold the record lock and have already
    /// checked the state.
    pub(crate) fn mark_consumed(&mut self, now: DateTime<Utc>, consumer: &str) {
        debug_assert_eq!(self.state, CapabilityState::Issued);
        self.state = CapabilityState::Consumed;
        self.consumed_at = Some(now);
        self.consumed_by = Some(consumer.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(now: DateTime<Utc>) -> CapabilityRecord {
        CapabilityRecord::issue(
            CapabilityId::new(),
            NewCapability {
                action_type: "crm:callback".into(),
                client_id: "C-105".into(),
                phone: "+79001234567".into(),
                issuer: "operator-1".into(),
                source_module: "mf-a".into(),
                issued_at: now,
                expires_at: now + Duration::seconds(30),
            },
        )
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = CapabilityId::new();
        let b = CapabilityId::new();
        assert!(a.as_str().starts_with("cap-"));
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let now = Utc::now();
        let mut rec = record(now);
        let deadline = rec.expires_at();

        assert_eq!(rec.expire_if_due(deadline), CapabilityState::Issued);
        assert_eq!(
            rec.expire_if_due(deadline + Duration::milliseconds(1)),
            CapabilityState::Expired
        );
    }

    #[test]
    fn consumed_record_never_becomes_expired() {
        let now = Utc::now();
        let mut rec = record(now);
        rec.mark_consumed(now, "operator-1");

        assert_eq!(
            rec.expire_if_due(now + Duration::hours(1)),
            CapabilityState::Consumed
        );
        assert_eq!(rec.consumed_by(), Some("operator-1"));
        assert_eq!(rec.consumed_at(), Some(now));
    }

    #[test]
    fn only_issued_is_live() {
        assert!(!CapabilityState::Issued.is_terminal());
        assert!(CapabilityState::Consumed.is_terminal());
        assert!(CapabilityState::Expired.is_terminal());
    }
}
