use chrono::{DateTime, Utc};
use policy::ActionType;
use serde::{Deserialize, Serialize};
use storage::CapabilityId;

/// A caller-asserted request to act on a client.
///
/// Comes from outside the trust boundary; nothing in it is believed until the
/// authority has checked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub client_id: String,
    pub phone: String,
}

impl Intent {
    pub fn new(client_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            phone: phone.into(),
        }
    }

    /// Both attributes are present.
    pub fn is_well_formed(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.phone.trim().is_empty()
    }
}

/// Everything the issuer needs besides the subject.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub intent: Intent,
    pub action_type: ActionType,
    /// The module that originated the intent.
    pub source_module: String,
}

impl IssueRequest {
    pub fn callback(intent: Intent, source_module: impl Into<String>) -> Self {
        Self {
            intent,
            action_type: ActionType::callback(),
            source_module: source_module.into(),
        }
    }
}

/// A freshly minted capability, as handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    pub capability_id: CapabilityId,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: u64,
}
