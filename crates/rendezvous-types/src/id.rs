//! Identifier types.
//!
//! [`RequestId`] is an opaque caller-supplied token; [`CallId`] and
//! [`BrokerId`] are generated by the broker.

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identifier validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// A request identifier must contain at least one character.
    #[error("request id must not be empty")]
    EmptyRequestId,
}

impl ErrorCode for IdError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyRequestId => "ID_EMPTY_REQUEST_ID",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Opaque token grouping a sequence of related events and their responses.
///
/// Every event sent under the same `RequestId` lands in the same FIFO and
/// is drained by the consumer(s) attached to that id. The broker never
/// interprets the token beyond equality and hashing.
///
/// Cloning is cheap: the token is reference counted, since the broker
/// copies it into every log record and error it produces.
///
/// # Example
///
/// ```
/// use rendezvous_types::RequestId;
///
/// let id = RequestId::try_new("chat-42").unwrap();
/// assert_eq!(id.to_string(), "chat-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Creates a request id, rejecting the empty string.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::EmptyRequestId`] if `value` is empty.
    pub fn try_new(value: impl AsRef<str>) -> Result<Self, IdError> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(IdError::EmptyRequestId);
        }
        Ok(Self(Arc::from(value)))
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RequestId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

impl TryFrom<String> for RequestId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0.to_string()
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one in-flight `send` call.
///
/// Response slots are keyed by `CallId`, never by the event payload, so
/// two equal payloads in flight under the same [`RequestId`] are still
/// paired with their own producers.
///
/// Values are allocated from a per-broker monotonically increasing
/// counter; use [`CallId::from_raw`] only in tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(u64);

impl CallId {
    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call:{}", self.0)
    }
}

/// Identifier of a broker instance.
///
/// Attached to log records so that several isolated brokers living in one
/// process (typical in tests) can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerId(pub Uuid);

#[allow(clippy::new_without_default)] // every broker gets a fresh id, a Default would hide that
impl BrokerId {
    /// Creates a new [`BrokerId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_rejects_empty() {
        assert_eq!(RequestId::try_new(""), Err(IdError::EmptyRequestId));
        assert_eq!("".parse::<RequestId>(), Err(IdError::EmptyRequestId));
    }

    #[test]
    fn request_id_keeps_token_verbatim() {
        let id = RequestId::try_new("  spaced token ").unwrap();
        assert_eq!(id.as_str(), "  spaced token ");
        assert_eq!(id.to_string(), "  spaced token ");
    }

    #[test]
    fn request_id_serde_is_plain_string() {
        let id = RequestId::try_new("req-A").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"req-A\"");

        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn request_id_deserialize_rejects_empty() {
        let result: Result<RequestId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn request_id_clone_shares_token() {
        let id = RequestId::try_new("shared").unwrap();
        let copy = id.clone();
        assert!(Arc::ptr_eq(&id.0, &copy.0));
    }

    #[test]
    fn call_id_orders_by_sequence() {
        let a = CallId::from_raw(1);
        let b = CallId::from_raw(2);
        assert!(a < b);
        assert_eq!(b.get(), 2);
        assert_eq!(a.to_string(), "call:1");
    }

    #[test]
    fn broker_id_display_prefix() {
        let id = BrokerId::new();
        assert!(id.to_string().starts_with("broker:"));
        assert_eq!(id.uuid(), id.0);
    }
}
