//! Error types for itag-core.
//!
//! None of these are fatal to a session: the state machine stays in
//! its current state on any error and recovers on the next successful
//! transport event of the same kind. There is no automatic retry; a
//! caller wishing to retry reissues the command.

use std::time::Duration;

use thiserror::Error;

use itag_types::{CharacteristicRole, ParseError};

/// Errors that can occur when communicating with an iTag peripheral.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error surfaced by the transport.
    #[error("transport error: {0}")]
    Transport(#[from] btleplug::Error),

    /// Command issued while the session is disconnected.
    #[error("not connected to tag")]
    NotConnected,

    /// Read or write attempted before the characteristic was discovered.
    #[error("characteristic for {role} not yet discovered")]
    CharacteristicUnavailable {
        /// The logical role whose handle is missing.
        role: CharacteristicRole,
    },

    /// Characteristic payload failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] ParseError),

    /// Tag not found during scan.
    #[error("tag not found: {0}")]
    DeviceNotFound(String),

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }
}

/// Result type alias using itag-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "not connected to tag");

        let err = Error::CharacteristicUnavailable {
            role: CharacteristicRole::Alarm,
        };
        assert!(err.to_string().contains("alarm"));

        let err = Error::timeout("scan", Duration::from_secs(5));
        assert!(err.to_string().contains("scan"));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::InsufficientBytes {
            expected: 1,
            actual: 0,
        }
        .into();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
