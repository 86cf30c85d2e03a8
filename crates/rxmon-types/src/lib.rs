//! Platform-agnostic types for HID++ 1.0 wireless receivers.
//!
//! This crate provides the report framing and typed notification events
//! shared by the receiver monitor (rxmon-core) and its tools.
//!
//! # Features
//!
//! - Immutable [`Report`] frames with header accessors
//! - Sub-identifier and register constants
//! - Decoders for connection, disconnection, discovery, passkey and
//!   pairing status notifications
//! - Error types for report decoding
//!
//! # Example
//!
//! ```
//! use rxmon_types::{ConnectionEvent, Report};
//!
//! let report = Report::from_bytes(&[0x10, 0x01, 0x41, 0x04, 0x01, 0x1b, 0x40]).unwrap();
//! let event = ConnectionEvent::try_from(&report).unwrap();
//! assert_eq!(event.index, 1);
//! ```

pub mod error;
pub mod report;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use report::{DeviceIndex, RECEIVER_INDEX, Report, ReportType, register, sub_id};
pub use types::{
    ConnectionEvent, DeviceKind, DisconnectionEvent, DiscoveryRecord, DiscoveryStatus, ErrorCode,
    NotificationFlags, PairStatus, Passkey,
};
