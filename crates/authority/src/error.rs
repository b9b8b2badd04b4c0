//! Rejections crossing the authority boundary.

use policy::DenyReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a request was refused.
///
/// Every variant maps to exactly one [`ReasonCode`]; the `Display` text is the
/// human-readable message that travels with it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The subject's role may not request this action type.
    #[error("{0}")]
    RoleForbidden(String),

    /// The client is outside the subject's permitted segment.
    #[error("{0}")]
    ClientOutOfScope(String),

    /// Too many issuance requests from one user within the window.
    #[error("too many capability requests, try again later")]
    RateLimited,

    /// The request was structurally invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("capability is unknown")]
    CapabilityUnknown,

    #[error("capability has expired")]
    CapabilityExpired,

    #[error("capability has already been used")]
    CapabilityReplay,

    #[error("capability authorizes {expected}, not {actual}")]
    ActionTypeMismatch { expected: String, actual: String },

    #[error("capability does not belong to this user")]
    SubjectMismatch,

    #[error("payload does not match the capability's bound client and phone")]
    PayloadMismatch,
}

impl Error {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Error::RoleForbidden(_) => ReasonCode::RoleForbidden,
            Error::ClientOutOfScope(_) => ReasonCode::ClientOutOfScope,
            Error::RateLimited => ReasonCode::RateLimited,
            Error::InvalidRequest(_) => ReasonCode::RequestInvalid,
            Error::CapabilityUnknown => ReasonCode::CapabilityUnknown,
            Error::CapabilityExpired => ReasonCode::CapabilityExpired,
            Error::CapabilityReplay => ReasonCode::CapabilityReplay,
            Error::ActionTypeMismatch { .. } => ReasonCode::ActionTypeMismatch,
            Error::SubjectMismatch => ReasonCode::SubjectMismatch,
            Error::PayloadMismatch => ReasonCode::PayloadMismatch,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.reason_code().class()
    }

    pub(crate) fn denied(reason: DenyReason, message: String) -> Self {
        match reason {
            DenyReason::RoleForbidden => Error::RoleForbidden(message),
            DenyReason::ClientOutOfScope => Error::ClientOutOfScope(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    RoleForbidden,
    ClientOutOfScope,
    RateLimited,
    RequestInvalid,
    CapabilityUnknown,
    CapabilityExpired,
    CapabilityReplay,
    ActionTypeMismatch,
    SubjectMismatch,
    PayloadMismatch,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::RoleForbidden => "ROLE_FORBIDDEN",
            ReasonCode::ClientOutOfScope => "CLIENT_OUT_OF_SCOPE",
            ReasonCode::RateLimited => "RATE_LIMITED",
            ReasonCode::RequestInvalid => "REQUEST_INVALID",
            ReasonCode::CapabilityUnknown => "CAPABILITY_UNKNOWN",
            ReasonCode::CapabilityExpired => "CAPABILITY_EXPIRED",
            ReasonCode::CapabilityReplay => "CAPABILITY_REPLAY",
            ReasonCode::ActionTypeMismatch => "ACTION_TYPE_MISMATCH",
            ReasonCode::SubjectMismatch => "SUBJECT_MISMATCH",
            ReasonCode::PayloadMismatch => "PAYLOAD_MISMATCH",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ReasonCode::RoleForbidden | ReasonCode::ClientOutOfScope => ErrorClass::Policy,
            ReasonCode::RateLimited => ErrorClass::Throttle,
            ReasonCode::RequestInvalid => ErrorClass::Request,
            ReasonCode::CapabilityUnknown
            | ReasonCode::CapabilityExpired
            | ReasonCode::CapabilityReplay => ErrorClass::Lifecycle,
            ReasonCode::ActionTypeMismatch
            | ReasonCode::SubjectMismatch
            | ReasonCode::PayloadMismatch => ErrorClass::Binding,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a caller should treat a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Adjust the request; never retried automatically.
    Policy,
    /// Back off and retry later.
    Throttle,
    /// Fix the request shape.
    Request,
    /// Terminal for the token; issue a new one.
    Lifecycle,
    /// Authorization scope and attempted action disagree.
    Binding,
}
