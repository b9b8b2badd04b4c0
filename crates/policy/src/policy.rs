//! Policy configuration and evaluation.

use crate::{ActionType, Error, Resource, Result, Role, Subject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Attribute rules gating capability issuance, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Roles that may never request a given action type.
    pub forbidden_roles: BTreeMap<ActionType, HashSet<Role>>,

    /// Client ids in scope start with this prefix...
    pub client_prefix: String,

    /// ...followed by exactly this many ASCII digits.
    pub client_digits: usize,
}

impl Default for Policy {
    /// Trainees may not place callbacks; only the `C-1xx` client segment is
    /// in scope.
    fn default() -> Self {
        let mut forbidden_roles = BTreeMap::new();
        forbidden_roles.insert(ActionType::callback(), HashSet::from([Role::Trainee]));

        Self {
            forbidden_roles,
            client_prefix: "C-1".to_string(),
            client_digits: 2,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    RoleForbidden,
    ClientOutOfScope,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::RoleForbidden => f.write_str("role_forbidden"),
            DenyReason::ClientOutOfScope => f.write_str("client_out_of_scope"),
        }
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: DenyReason, message: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl Policy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let policy: Self = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the rules can ever admit a client.
    pub fn validate(&self) -> Result<()> {
        if self.client_prefix.is_empty() {
            return Err(Error::Invalid("client_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Decide whether `subject` may obtain a capability for `resource`.
    ///
    /// Pure: no I/O, no clock, no store.
    pub fn evaluate(&self, subject: &Subject, resource: &Resource) -> Decision {
        let forbidden = self
            .forbidden_roles
            .get(&resource.action_type)
            .is_some_and(|roles| roles.contains(&subject.role));
        if forbidden {
            return Decision::Deny {
                reason: DenyReason::RoleForbidden,
                message: format!(
                    "role {} is not allowed to request {}",
                    subject.role, resource.action_type
                ),
            };
        }

        if !self.client_in_scope(&resource.client_id) {
            return Decision::Deny {
                reason: DenyReason::ClientOutOfScope,
                message: format!(
                    "client {} is outside the {}{} segment",
                    resource.client_id,
                    self.client_prefix,
                    "x".repeat(self.client_digits)
                ),
            };
        }

        Decision::Allow
    }

    fn client_in_scope(&self, client_id: &str) -> bool {
        let Some(rest) = client_id.strip_prefix(&self.client_prefix) else {
            return false;
        };
        rest.len() == self.client_digits && rest.bytes().all(|b| b.is_ascii_digit())
    }
}
