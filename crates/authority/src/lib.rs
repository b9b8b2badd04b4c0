//! Capability authorization: issuance and single-use enforcement.
//!
//! A caller that wants to perform a sensitive action (placing a callback to a
//! client) first asks the [`Authority`] for a capability. The authority checks
//! the request against the [`Policy`](policy::Policy), mints a short-lived
//! record bound to the exact client id and phone, and returns an opaque
//! token. Presenting that token with the same payload authorizes the action
//! once; every later attempt is rejected.
//!
//! # Overview
//!
//! - **Issuer** ([`Authority::issue`]): request validation, per-user rate
//!   limit, policy evaluation, mint.
//! - **Executor** ([`Authority::consume`]): lookup, expiry, replay, binding,
//!   atomic consumption, then the registered [`ActionHandler`].
//! - **Errors**: one closed [`Error`] enum; each variant has a
//!   [`ReasonCode`] for the wire.
//!
//! # Example
//!
//! ```
//! use authority::{Authority, AuthorityConfig, Error, Intent, IssueRequest};
//! use policy::{ActionType, Policy, Subject};
//!
//! let authority = Authority::new(Policy::default(), AuthorityConfig::default())?;
//! let operator = Subject::operator("operator-1");
//! let intent = Intent::new("C-105", "+79001234567");
//!
//! let token = authority
//!     .issue(&operator, &IssueRequest::callback(intent.clone(), "mf-a"))
//!     .unwrap();
//!
//! let receipt = authority
//!     .consume(&operator, &token.capability_id, &ActionType::callback(), &intent)
//!     .unwrap();
//! println!("placed {}", receipt.action_id);
//!
//! let replay = authority.consume(&operator, &token.capability_id, &ActionType::callback(), &intent);
//! assert_eq!(replay.unwrap_err(), Error::CapabilityReplay);
//! # Ok::<(), authority::ConfigError>(())
//! ```

mod action;
mod authority;
mod clock;
mod config;
mod error;
mod executor;
mod intent;
mod issuer;
mod rate_limit;

pub use action::{ActionHandler, ActionId, ActionReceipt, PlaceCallback};
pub use authority::{Authority, AuthorityBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthorityConfig, ConfigError, RateLimitConfig, MAX_TTL_SECS};
pub use error::{Error, ErrorClass, ReasonCode, Result};
pub use intent::{CapabilityToken, Intent, IssueRequest};
pub use rate_limit::RateLimiter;
