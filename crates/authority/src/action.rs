//! Domain actions a capability can unlock.

use chrono::{DateTime, Utc};
use policy::ActionType;
use serde::{Deserialize, Serialize};
use storage::{CapabilityId, CapabilityRecord};
use uuid::Uuid;

/// Identifier of a performed action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Performs the side effect behind an action type.
///
/// Called only after the capability has been consumed, exactly once per
/// capability. Implementations must not block.
pub trait ActionHandler: Send + Sync {
    /// The action type this handler serves.
    fn action_type(&self) -> ActionType;

    /// Carry out the action the consumed capability authorized.
    fn perform(&self, capability: &CapabilityRecord) -> ActionId;
}

/// Places a (simulated) callback to the bound client.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceCallback;

impl ActionHandler for PlaceCallback {
    fn action_type(&self) -> ActionType {
        ActionType::callback()
    }

    fn perform(&self, capability: &CapabilityRecord) -> ActionId {
        let call_id = ActionId::new(format!("CALL-{}", Uuid::new_v4()));
        tracing::info!(
            call_id = %call_id,
            capability_id = %capability.id(),
            client_id = capability.bound_client_id(),
            phone = capability.bound_phone(),
            source_module = capability.source_module(),
            "callback placed"
        );
        call_id
    }
}

/// Proof that a capability was spent on an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub action_id: ActionId,
    pub capability_id: CapabilityId,
    pub action_type: ActionType,
    pub consumed_at: DateTime<Utc>,
}
