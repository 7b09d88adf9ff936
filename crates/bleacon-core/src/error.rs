//! Error types for bleacon-core.
//!
//! Errors only surface from operations that return a `Result`: acquiring a
//! scanner, talking to a GATT connection, or calling the platform backend
//! directly. The beacon dispatch path never reports errors to the found
//! callback; a missing or malformed payload simply produces no report.
//!
//! | Error Type | Typical cause |
//! |------------|---------------|
//! | [`Error::Bluetooth`] | The host Bluetooth stack rejected an operation |
//! | [`Error::NoAdapter`] | No Bluetooth adapter on this machine |
//! | [`Error::Timeout`] | Scanner never became available, or a connect timed out |
//! | [`Error::ServiceNotFound`] / [`Error::CharacteristicNotFound`] | The peer does not expose the requested GATT target |
//! | [`Error::ConnectionFailed`] | The peer could not be reached |

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while scanning for or connecting to beacons.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the host stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// The adapter is powered off and could not be enabled.
    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    /// No known peripheral matches the identifier.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation attempted on a closed connection.
    #[error("Not connected to device")]
    NotConnected,

    /// The connected peer does not expose the service.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The missing service UUID.
        uuid: Uuid,
    },

    /// The service does not contain the characteristic.
    #[error("Characteristic not found: {uuid} (in service {service})")]
    CharacteristicNotFound {
        /// The missing characteristic UUID.
        uuid: Uuid,
        /// The service that was searched.
        service: Uuid,
    },

    /// Connection failed with a specific reason.
    #[error("Connection to {device_id} failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: String,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A payload or filter could not be parsed.
    #[error(transparent)]
    Parse(#[from] bleacon_types::ParseError),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Device is out of range.
    OutOfRange,
    /// Device rejected the connection.
    Rejected,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed {
            device_id: device_id.into(),
            reason,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: Uuid, service: Uuid) -> Self {
        Self::CharacteristicNotFound { uuid, service }
    }
}

/// Result type alias using bleacon-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
