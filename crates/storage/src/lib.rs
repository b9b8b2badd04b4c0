//! Capability storage and audit trail.
//!
//! This crate holds the state behind capability authorization: the records
//! that say who may do what, to whom, until when, and the append-only log of
//! every decision taken about them.
//!
//! # Overview
//!
//! 1. **Capability Store**: In-memory, keyed by [`CapabilityId`]. Every state
//!    change goes through a single per-record critical section, so a token
//!    can be consumed at most once no matter how many callers race for it.
//!
//! 2. **Audit Log**: SQLite-backed history of issuance and consumption,
//!    answering "who got this token, and what happened to it?".
//!
//! # Core Concepts
//!
//! ## CapabilityRecord
//!
//! A [`CapabilityRecord`] binds an action type to the exact client id and
//! phone it authorizes, names its issuer, and carries an expiry. Its
//! [`CapabilityState`] moves `Issued -> Consumed` or `Issued -> Expired` and
//! never leaves a terminal state.
//!
//! ## CapabilityStore
//!
//! [`CapabilityStore::consume`] is the one primitive for spending a
//! capability: lazy expiry, terminal-state refusal, the caller's binding
//! check and the transition all happen under the same lock.
//!
//! ## AuditLog
//!
//! [`AuditLog`] stores [`AuditEvent`]s, each tagged with an [`AuditKind`].
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use storage::{CapabilityState, CapabilityStore, ConsumeError, NewCapability};
//!
//! let store = CapabilityStore::new();
//! let now = Utc::now();
//! let record = store.mint(NewCapability {
//!     action_type: "crm:callback".into(),
//!     client_id: "C-105".into(),
//!     phone: "+79001234567".into(),
//!     issuer: "operator-1".into(),
//!     source_module: "mf-a".into(),
//!     issued_at: now,
//!     expires_at: now + Duration::seconds(30),
//! });
//!
//! let consumed = store
//!     .consume(record.id(), now, "operator-1", |_| Ok::<(), ()>(()))
//!     .unwrap();
//! assert_eq!(consumed.state(), CapabilityState::Consumed);
//!
//! let replay = store.consume(record.id(), now, "operator-1", |_| Ok::<(), ()>(()));
//! assert_eq!(replay, Err(ConsumeError::Replay));
//! ```

mod audit;
mod error;
mod event;
mod record;
mod store;

pub use audit::AuditLog;
pub use error::{Error, Result};
pub use event::{AuditEvent, AuditKind};
pub use record::{CapabilityId, CapabilityRecord, CapabilityState, NewCapability};
pub use store::{CapabilityStore, ConsumeError};
