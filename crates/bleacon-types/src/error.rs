//! Error types for data parsing in bleacon-types.

use thiserror::Error;

/// Errors that can occur when parsing beacon payloads or building filters.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in bleacon-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Payload was shorter than the format requires.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// A field held a value the format does not allow.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A scan filter was constructed with inconsistent parts.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

impl ParseError {
    /// Create an insufficient bytes error.
    pub fn insufficient(expected: usize, actual: usize) -> Self {
        Self::InsufficientBytes { expected, actual }
    }
}

/// Result type alias using bleacon-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
