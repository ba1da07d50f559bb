//! Broker errors.
//!
//! All errors implement [`ErrorCode`] for standardized handling.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`BrokerError::Timeout`] | `BROKER_TIMEOUT` | Yes |
//! | [`BrokerError::Closed`] | `BROKER_CLOSED` | No |
//! | [`BrokerError::HandlerFailed`] | `BROKER_HANDLER_FAILED` | No |
//! | [`BrokerError::ProtocolViolation`] | `BROKER_PROTOCOL_VIOLATION` | No |
//! | [`BrokerError::ResponseLost`] | `BROKER_RESPONSE_LOST` | Yes |
//!
//! # Who sees what
//!
//! Producers (`send`) see `Timeout`, `Closed`, `HandlerFailed` and
//! `ResponseLost`. Consumers (`consume`) only ever return
//! `ProtocolViolation`; every other consumer-side failure is converted into
//! a value delivered to the waiting producer.

use rendezvous_types::{CallId, ErrorCode, RequestId};
use thiserror::Error;

/// Rendezvous broker error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The producer stopped waiting before a response arrived.
    #[error("{call_id} on {request_id} timed out waiting for a response")]
    Timeout {
        request_id: RequestId,
        call_id: CallId,
    },

    /// The request channel was closed, evicted or shut down.
    #[error("request channel closed: {0}")]
    Closed(RequestId),

    /// The consumer's handler returned an error or panicked.
    #[error("handler failed: {0}")]
    HandlerFailed(String),

    /// A consumer dequeued an event with no registered response slot.
    #[error("no response slot for {call_id} on {request_id}")]
    ProtocolViolation {
        request_id: RequestId,
        call_id: CallId,
    },

    /// The response slot was dropped without a value.
    #[error("response for {call_id} on {request_id} was lost")]
    ResponseLost {
        request_id: RequestId,
        call_id: CallId,
    },
}

impl ErrorCode for BrokerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "BROKER_TIMEOUT",
            Self::Closed(_) => "BROKER_CLOSED",
            Self::HandlerFailed(_) => "BROKER_HANDLER_FAILED",
            Self::ProtocolViolation { .. } => "BROKER_PROTOCOL_VIOLATION",
            Self::ResponseLost { .. } => "BROKER_RESPONSE_LOST",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ResponseLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendezvous_types::assert_error_codes;

    fn rid() -> RequestId {
        RequestId::try_new("req").unwrap()
    }

    fn all_variants() -> Vec<BrokerError> {
        let call_id = CallId::from_raw(1);
        vec![
            BrokerError::Timeout {
                request_id: rid(),
                call_id,
            },
            BrokerError::Closed(rid()),
            BrokerError::HandlerFailed("x".into()),
            BrokerError::ProtocolViolation {
                request_id: rid(),
                call_id,
            },
            BrokerError::ResponseLost {
                request_id: rid(),
                call_id,
            },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "BROKER_");
    }

    #[test]
    fn broker_error_recoverable() {
        let recoverable: Vec<_> = all_variants()
            .into_iter()
            .filter(|e| e.is_recoverable())
            .map(|e| e.code())
            .collect();
        assert_eq!(recoverable, vec!["BROKER_TIMEOUT", "BROKER_RESPONSE_LOST"]);
    }

    #[test]
    fn display_names_call_and_request() {
        let err = BrokerError::ProtocolViolation {
            request_id: rid(),
            call_id: CallId::from_raw(9),
        };
        assert_eq!(err.to_string(), "no response slot for call:9 on req");
    }
}
