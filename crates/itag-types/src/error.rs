//! Error types for data parsing in itag-types.

use thiserror::Error;

/// Errors that can occur when decoding iTag characteristic payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in itag-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// Payload shorter than the characteristic's fixed length.
    #[error("insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Expected payload size.
        expected: usize,
        /// Actual payload size received.
        actual: usize,
    },

    /// Payload had the right length but an out-of-contract value.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using itag-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
