//! Error types for report decoding in rxmon-types.

use thiserror::Error;

/// Errors that can occur when decoding HID++ receiver reports.
///
/// This error type is transport-agnostic and does not include
/// I/O or protocol-exchange errors (those belong in rxmon-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The first byte is not a HID++ short or long report type.
    #[error("Unknown report type 0x{0:02x}")]
    UnknownReportType(u8),

    /// Not enough bytes for the declared report type.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Number of bytes the frame requires.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// Parameters do not fit into the requested report type.
    #[error("Too many parameters: {len} bytes exceeds the {max} byte limit")]
    TooManyParams {
        /// Number of parameter bytes supplied.
        len: usize,
        /// Maximum parameter length for the report type.
        max: usize,
    },

    /// The report carries a different sub-identifier than the decoder expects.
    #[error("Unexpected sub-id 0x{actual:02x} (expected 0x{expected:02x})")]
    UnexpectedSubId {
        /// Sub-identifier the decoder handles.
        expected: u8,
        /// Sub-identifier found in the report.
        actual: u8,
    },

    /// The report is short where a long report is required (or vice versa).
    #[error("Unexpected report type {0:?}")]
    UnexpectedReportType(crate::report::ReportType),

    /// Failed to parse data due to malformed content.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using rxmon-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
