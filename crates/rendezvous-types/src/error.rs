//! Unified error-code interface.
//!
//! Every error type in the workspace implements [`ErrorCode`] so that
//! callers can branch on a stable machine-readable code and decide
//! whether a retry makes sense, without matching on concrete enums from
//! other crates.
//!
//! # Example
//!
//! ```
//! use rendezvous_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum QueueError {
//!     Full,
//!     Gone,
//! }
//!
//! impl ErrorCode for QueueError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Full => "QUEUE_FULL",
//!             Self::Gone => "QUEUE_GONE",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Full)
//!     }
//! }
//!
//! assert_eq!(QueueError::Full.code(), "QUEUE_FULL");
//! assert!(!QueueError::Gone.is_recoverable());
//! ```

/// Machine-readable error classification.
///
/// # Code Format
///
/// - UPPER_SNAKE_CASE
/// - Prefixed with the owning area (`BROKER_`, `CONFIG_`, `ID_`)
/// - Stable once published
///
/// # Recoverability
///
/// An error is recoverable when repeating the same call may succeed,
/// e.g. a timeout while the consumer was busy. Closed channels, handler
/// failures and protocol violations are not.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns whether a retry may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code is well formed and carries `expected_prefix`.
///
/// Intended for tests that enumerate every variant of an error enum.
///
/// # Panics
///
/// Panics if the code is empty, lacks the prefix, or is not
/// UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use rendezvous_types::{assert_error_code, ErrorCode};
///
/// struct Stale;
///
/// impl ErrorCode for Stale {
///     fn code(&self) -> &'static str { "CACHE_STALE" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Stale, "CACHE_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Runs [`assert_error_code`] over a list of variants.
///
/// # Panics
///
/// Panics on the first malformed code.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Sample {
        Good,
        Lower,
        Unprefixed,
    }

    impl ErrorCode for Sample {
        fn code(&self) -> &'static str {
            match self {
                Self::Good => "SAMPLE_OK",
                Self::Lower => "SAMPLE_lower",
                Self::Unprefixed => "OTHER_OK",
            }
        }

        fn is_recoverable(&self) -> bool {
            false
        }
    }

    #[test]
    fn well_formed_code_passes() {
        assert_error_codes(&[Sample::Good], "SAMPLE_");
    }

    #[test]
    #[should_panic(expected = "UPPER_SNAKE_CASE")]
    fn lowercase_code_panics() {
        assert_error_code(&Sample::Lower, "SAMPLE_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn wrong_prefix_panics() {
        assert_error_code(&Sample::Unprefixed, "SAMPLE_");
    }

    #[test]
    fn upper_snake_case_rules() {
        assert!(is_upper_snake_case("BROKER_TIMEOUT"));
        assert!(is_upper_snake_case("ID_2"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("_BROKER"));
        assert!(!is_upper_snake_case("BROKER_"));
        assert!(!is_upper_snake_case("BROKER__TIMEOUT"));
        assert!(!is_upper_snake_case("Broker"));
    }
}
