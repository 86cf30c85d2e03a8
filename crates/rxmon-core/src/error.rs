//! Error types for rxmon-core.
//!
//! This module defines the errors that can occur while talking to a
//! receiver or while a consumer handles a device lifecycle event.
//!
//! # Where errors end up
//!
//! | Source | Surfaced as |
//! |--------|-------------|
//! | Register exchange from a public method | returned to the caller |
//! | [`ReceiverHandler::add_device`] / [`ReceiverHandler::remove_device`] | logged at error level, then dropped |
//! | Pairing command issued from a background task | logged at error level, then dropped |
//! | Undecodable inbound frame | skipped with a trace/debug log |
//! | Status report that does not fit the pairing state | ignored silently |
//!
//! No error inside the monitor stops it from processing later reports.
//!
//! [`ReceiverHandler::add_device`]: crate::monitor::ReceiverHandler::add_device
//! [`ReceiverHandler::remove_device`]: crate::monitor::ReceiverHandler::remove_device

use std::time::Duration;

use thiserror::Error;

use rxmon_types::{DeviceIndex, ErrorCode, ParseError};

/// Errors that can occur when monitoring a receiver.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A report could not be built or decoded.
    #[error("Invalid report: {0}")]
    Parse(#[from] ParseError),

    /// No response arrived in time.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The receiver rejected a register access.
    #[error("Receiver rejected sub-id 0x{sub_id:02x} register 0x{address:02x}: {code}")]
    Protocol {
        /// Sub-identifier of the failed request.
        sub_id: u8,
        /// Register address of the failed request.
        address: u8,
        /// Error reported by the receiver.
        code: ErrorCode,
    },

    /// The receiver does not support the requested operation.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A pairing attempt is already running.
    #[error("A pairing attempt is already in progress")]
    PairingInProgress,

    /// No raw device exists at the given path.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The transport to the receiver is gone.
    #[error("Receiver disconnected: {0}")]
    Disconnected(String),

    /// A consumer failed to handle a device.
    #[error("Device {index}: {reason}")]
    Device {
        /// Device slot.
        index: DeviceIndex,
        /// Human-readable description.
        reason: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a device error from any displayable reason.
    pub fn device(index: DeviceIndex, reason: impl Into<String>) -> Self {
        Self::Device {
            index,
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }
}

/// Result type alias using rxmon-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = Error::Protocol {
            sub_id: 0x80,
            address: 0xb2,
            code: ErrorCode::Busy,
        };
        assert_eq!(
            err.to_string(),
            "Receiver rejected sub-id 0x80 register 0xb2: busy"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("enumerate", Duration::from_millis(500));
        assert_eq!(err.to_string(), "Operation 'enumerate' timed out after 500ms");
    }

    #[test]
    fn test_device_error_display() {
        let err = Error::device(3, "feature discovery failed");
        assert_eq!(err.to_string(), "Device 3: feature discovery failed");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::UnknownReportType(0x20).into();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("0x20"));
    }
}
