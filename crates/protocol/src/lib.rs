//! Boundary of the capability authorization service.
//!
//! This crate exposes the [`Authority`](authority::Authority) to callers as
//! newline-delimited JSON-RPC 2.0 (one request per line in, one response per
//! line out), and provides the in-process [`IntentRelay`] that untrusted
//! modules use to hand intents to the caller that will request a capability.
//!
//! # Methods
//!
//! | method               | params                                                         | result                                |
//! |----------------------|----------------------------------------------------------------|---------------------------------------|
//! | `capabilities/issue` | `context`, `clientId`, `phone`, `actionType`, `sourceModule`   | `capabilityToken`, `expiresInSeconds` |
//! | `actions/callback`   | `context`, `capabilityToken`, `clientId`, `phone`              | `status`, `actionId`                  |
//!
//! Rejections are JSON-RPC errors with code `-32000` and
//! `data = {reasonCode, message}`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use authority::{Authority, AuthorityConfig};
//! use policy::Policy;
//! use protocol::{serve, ServerOptions};
//!
//! # async fn example() -> protocol::Result<()> {
//! let authority = Arc::new(
//!     Authority::new(Policy::default(), AuthorityConfig::default()).expect("valid config"),
//! );
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! serve(authority, stdin, tokio::io::stdout(), ServerOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod relay;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    ApiError, CallbackParams, CallbackResult, IssueCapabilityParams, IssueCapabilityResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use relay::{DEFAULT_CAPACITY, IntentListener, IntentRelay, RelayedIntent, parse_intent};
pub use server::{
    MAX_REQUEST_SIZE, METHOD_CALLBACK, METHOD_ISSUE, ServerOptions, handle_line, serve,
};
