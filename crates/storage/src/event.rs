//! Event types for the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a capability request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditKind {
    /// A capability was minted.
    Issued {
        capability_id: String,
        user_id: String,
        role: String,
        action_type: String,
        client_id: String,
        source_module: String,
        expires_at: DateTime<Utc>,
    },
    /// Issuance was refused (policy, rate limit, invalid request).
    Denied {
        user_id: String,
        role: String,
        client_id: String,
        reason: String,
    },
    /// A capability was consumed and its action performed.
    Consumed {
        capability_id: String,
        user_id: String,
        action_type: String,
        action_id: String,
    },
    /// A consume attempt was refused.
    Rejected {
        capability_id: String,
        user_id: String,
        reason: String,
    },
}

impl AuditKind {
    /// Stable name used for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            AuditKind::Issued { .. } => "issued",
            AuditKind::Denied { .. } => "denied",
            AuditKind::Consumed { .. } => "consumed",
            AuditKind::Rejected { .. } => "rejected",
        }
    }

    /// The capability this event concerns, if one exists.
    pub fn capability_id(&self) -> Option<&str> {
        match self {
            AuditKind::Issued { capability_id, .. }
            | AuditKind::Consumed { capability_id, .. }
            | AuditKind::Rejected { capability_id, .. } => Some(capability_id),
            AuditKind::Denied { .. } => None,
        }
    }
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
}

impl AuditEvent {
    pub fn new(timestamp: DateTime<Utc>, kind: AuditKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
        }
    }
}
