use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag naming the domain action a capability may authorize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(String);

impl ActionType {
    /// Placing a callback to a client.
    pub const CALLBACK: &'static str = "crm:callback";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn callback() -> Self {
        Self::new(Self::CALLBACK)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The resource attributes a capability request targets.
#[derive(Debug, Clone)]
pub struct Resource {
    pub action_type: ActionType,
    pub client_id: String,
}

impl Resource {
    pub fn new(action_type: ActionType, client_id: impl Into<String>) -> Self {
        Self {
            action_type,
            client_id: client_id.into(),
        }
    }

    pub fn callback(client_id: impl Into<String>) -> Self {
        Self::new(ActionType::callback(), client_id)
    }
}
