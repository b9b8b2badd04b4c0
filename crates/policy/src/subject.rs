//! Subject attributes supplied by the authentication layer.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role carried by the caller's identity context.
///
/// Parsing is case-insensitive; the canonical form is upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Operator,
    Supervisor,
    Trainee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Operator => "OPERATOR",
            Role::Supervisor => "SUPERVISOR",
            Role::Trainee => "TRAINEE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPERATOR" => Ok(Role::Operator),
            "SUPERVISOR" => Ok(Role::Supervisor),
            "TRAINEE" => Ok(Role::Trainee),
            _ => Err(Error::UnknownRole(s.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// The authenticated caller of a request.
///
/// Produced outside this crate (identity headers, gateway claims) and taken
/// as given; nothing here re-derives trust from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub user_id: String,
    pub role: Role,
}

impl Subject {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn operator(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Operator)
    }

    pub fn trainee(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Trainee)
    }
}
