//! Core types for the rendezvous broker.
//!
//! This crate holds the small vocabulary shared by every layer of the
//! broker: identifiers and the unified error-code interface.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Types Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rendezvous-types   : RequestId, CallId, ErrorCode  ◄── HERE │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runtime Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rendezvous-runtime : Broker, RequestChannel, config         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifiers
//!
//! | Type | Shape | Purpose |
//! |------|-------|---------|
//! | [`RequestId`] | non-empty string | Groups the events of one logical request |
//! | [`CallId`] | `u64` sequence | Keys the response slot of one `send` call |
//! | [`BrokerId`] | UUID v4 | Distinguishes broker instances in logs |
//!
//! # Example
//!
//! ```
//! use rendezvous_types::{CallId, RequestId};
//!
//! let rid = RequestId::try_new("req-A").unwrap();
//! assert_eq!(rid.as_str(), "req-A");
//!
//! // Empty tokens are rejected
//! assert!(RequestId::try_new("").is_err());
//!
//! let call = CallId::from_raw(7);
//! assert_eq!(call.to_string(), "call:7");
//! ```

mod error;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{BrokerId, CallId, IdError, RequestId};
