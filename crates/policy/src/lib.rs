//! Attribute-based policy for capability issuance.
//!
//! Core principle: **a capability is only ever minted for a request the
//! policy allows.** Evaluation is a pure function of the subject's and the
//! resource's attributes, so it can be tested without any store.

mod capability;
mod error;
mod policy;
mod subject;

pub use capability::{ActionType, Resource};
pub use error::{Error, Result};
pub use policy::{Decision, DenyReason, Policy};
pub use subject::{Role, Subject};
