//! Consumer-side event handlers.
//!
//! A consumer attaches an [`EventHandler`] to a request id with
//! [`Broker::consume`](super::Broker::consume). The handler maps each
//! event to a response, or to a [`HandlerError`] that is forwarded to the
//! waiting producer as [`BrokerError::HandlerFailed`](super::BrokerError::HandlerFailed).
//!
//! Any `FnMut(E) -> Result<R, HandlerError>` closure is a handler:
//!
//! ```
//! use rendezvous_runtime::broker::{EventHandler, HandlerError};
//!
//! let mut upper = |event: String| -> Result<String, HandlerError> {
//!     Ok(event.to_uppercase())
//! };
//! assert_eq!(upper.handle("step:1".to_string()).unwrap(), "STEP:1");
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Error returned by an [`EventHandler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Maps events of one request id to responses.
///
/// With [`Broker::consume`](super::Broker::consume) handlers run inline on
/// the consumer task, so a handler that blocks on synchronous I/O or a long
/// computation stalls a runtime worker; on a current-thread
/// runtime it stalls every producer too. Attach such handlers with
/// [`Broker::consume_blocking`](super::Broker::consume_blocking), which
/// runs each call on Tokio's blocking pool.
///
/// A handler that panics does not take the consume loop down: the panic is
/// caught and reported to the producer as a handler failure.
pub trait EventHandler<E, R>: Send {
    /// Computes the response for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when no response can be produced.
    fn handle(&mut self, event: E) -> Result<R, HandlerError>;
}

impl<E, R, F> EventHandler<E, R> for F
where
    F: FnMut(E) -> Result<R, HandlerError> + Send,
{
    fn handle(&mut self, event: E) -> Result<R, HandlerError> {
        self(event)
    }
}

/// Runs the handler, converting a panic into a [`HandlerError`].
pub(crate) fn invoke<E, R, H>(handler: &mut H, event: E) -> Result<R, HandlerError>
where
    H: EventHandler<E, R> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::new(format!(
            "handler panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        seen: usize,
    }

    impl EventHandler<u32, usize> for Counter {
        fn handle(&mut self, event: u32) -> Result<usize, HandlerError> {
            if event == 0 {
                return Err("zero is not allowed".into());
            }
            self.seen += 1;
            Ok(self.seen)
        }
    }

    #[test]
    fn struct_handler_keeps_state() {
        let mut counter = Counter { seen: 0 };
        assert_eq!(invoke(&mut counter, 5), Ok(1));
        assert_eq!(invoke(&mut counter, 7), Ok(2));
    }

    #[test]
    fn handler_error_passes_through() {
        let mut counter = Counter { seen: 0 };
        let err = invoke(&mut counter, 0).unwrap_err();
        assert_eq!(err.message(), "zero is not allowed");
    }

    #[test]
    fn closure_is_handler() {
        let mut len = |s: String| -> Result<usize, HandlerError> { Ok(s.len()) };
        assert_eq!(invoke(&mut len, "abc".to_string()), Ok(3));
    }

    #[test]
    fn panic_with_str_is_caught() {
        let mut boom = |_: ()| -> Result<(), HandlerError> { panic!("kaboom") };
        let err = invoke(&mut boom, ()).unwrap_err();
        assert_eq!(err.message(), "handler panicked: kaboom");
    }

    #[test]
    fn panic_with_string_is_caught() {
        let mut boom = |n: u8| -> Result<(), HandlerError> { panic!("bad value {n}") };
        let err = invoke(&mut boom, 3).unwrap_err();
        assert_eq!(err.message(), "handler panicked: bad value 3");
    }
}
