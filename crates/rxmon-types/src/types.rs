//! Typed receiver events decoded from HID++ reports.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::report::{DeviceIndex, Report, ReportType, sub_id};

/// Kind of peripheral reported in a connection notification.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new kinds
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum DeviceKind {
    /// Not reported by the receiver.
    Unknown,
    /// Keyboard.
    Keyboard,
    /// Mouse.
    Mouse,
    /// Numeric keypad.
    Numpad,
    /// Presentation remote.
    Presenter,
    /// Trackball.
    Trackball,
    /// Touchpad.
    Touchpad,
    /// Any other code.
    Other(u8),
}

impl From<u8> for DeviceKind {
    fn from(value: u8) -> Self {
        match value {
            0x00 => DeviceKind::Unknown,
            0x01 => DeviceKind::Keyboard,
            0x02 => DeviceKind::Mouse,
            0x03 => DeviceKind::Numpad,
            0x04 => DeviceKind::Presenter,
            0x08 => DeviceKind::Trackball,
            0x09 => DeviceKind::Touchpad,
            other => DeviceKind::Other(other),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Unknown => write!(f, "unknown"),
            DeviceKind::Keyboard => write!(f, "keyboard"),
            DeviceKind::Mouse => write!(f, "mouse"),
            DeviceKind::Numpad => write!(f, "numpad"),
            DeviceKind::Presenter => write!(f, "presenter"),
            DeviceKind::Trackball => write!(f, "trackball"),
            DeviceKind::Touchpad => write!(f, "touchpad"),
            DeviceKind::Other(code) => write!(f, "kind 0x{code:02x}"),
        }
    }
}

/// A device attached to the receiver.
///
/// Either decoded from a `DeviceConnection` notification or synthesized
/// when a device is detected from ordinary traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionEvent {
    /// Device slot.
    pub index: DeviceIndex,
    /// Device speaks the Unifying protocol.
    pub unifying: bool,
    /// Device kind.
    pub device_type: DeviceKind,
    /// Host software presence was signalled to the device.
    pub software_present: bool,
    /// Link is encrypted.
    pub encrypted: bool,
    /// Radio link is up.
    pub link_established: bool,
    /// Notification carried a payload.
    pub with_payload: bool,
    /// Synthesized from traffic rather than decoded.
    pub from_timeout_check: bool,
    /// Wireless product id.
    pub pid: u16,
}

impl ConnectionEvent {
    /// Build the event used when a device is found through its traffic
    /// instead of a connection notification.
    #[must_use]
    pub fn synthesized(index: DeviceIndex) -> Self {
        Self {
            index,
            unifying: false,
            device_type: DeviceKind::Unknown,
            software_present: false,
            encrypted: false,
            link_established: true,
            with_payload: false,
            from_timeout_check: true,
            pid: 0,
        }
    }
}

impl TryFrom<&Report> for ConnectionEvent {
    type Error = ParseError;

    /// Decode a `DeviceConnection` notification.
    ///
    /// # Examples
    ///
    /// ```
    /// use rxmon_types::{ConnectionEvent, DeviceKind, Report};
    ///
    /// let report = Report::from_bytes(&[0x10, 0x02, 0x41, 0x04, 0x02, 0x2a, 0x40]).unwrap();
    /// let event = ConnectionEvent::try_from(&report).unwrap();
    /// assert_eq!(event.index, 2);
    /// assert!(event.unifying);
    /// assert_eq!(event.device_type, DeviceKind::Mouse);
    /// assert!(event.link_established);
    /// assert_eq!(event.pid, 0x402a);
    /// ```
    fn try_from(report: &Report) -> ParseResult<Self> {
        report.expect(sub_id::DEVICE_CONNECTION, None)?;
        let params = report.params();
        let flags = params[0];
        Ok(Self {
            index: report.device_index(),
            unifying: report.address() & 0b111 == 0x04,
            device_type: DeviceKind::from(flags & 0x0f),
            software_present: flags & (1 << 4) != 0,
            encrypted: flags & (1 << 5) != 0,
            link_established: flags & (1 << 6) == 0,
            with_payload: flags & (1 << 7) != 0,
            from_timeout_check: false,
            pid: u16::from_le_bytes([params[1], params[2]]),
        })
    }
}

/// A device detached from the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisconnectionEvent {
    /// Device slot.
    pub index: DeviceIndex,
    /// The pairing was removed, not just the link.
    pub unpaired: bool,
}

impl TryFrom<&Report> for DisconnectionEvent {
    type Error = ParseError;

    fn try_from(report: &Report) -> ParseResult<Self> {
        report.expect(sub_id::DEVICE_DISCONNECTION, None)?;
        Ok(Self {
            index: report.device_index(),
            unpaired: report.address() == 0x02,
        })
    }
}

/// Discovery started or stopped on a Bolt receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveryStatus {
    /// Receiver is discovering.
    pub discovering: bool,
    /// Error code (0 when none).
    pub error: u8,
}

impl TryFrom<&Report> for DiscoveryStatus {
    type Error = ParseError;

    fn try_from(report: &Report) -> ParseResult<Self> {
        report.expect(sub_id::DISCOVERY_STATUS, None)?;
        Ok(Self {
            discovering: report.address() & 0x01 != 0,
            error: report.params()[0],
        })
    }
}

/// Pairing opened or closed.
///
/// Decoded from both the legacy `PairStatus` and the Bolt
/// `BoltPairStatus` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairStatus {
    /// Receiver accepts a new pairing.
    pub pairing: bool,
    /// Error code (0 when none).
    pub error: u8,
}

impl TryFrom<&Report> for PairStatus {
    type Error = ParseError;

    fn try_from(report: &Report) -> ParseResult<Self> {
        match report.sub_id() {
            sub_id::PAIR_STATUS | sub_id::BOLT_PAIR_STATUS => Ok(Self {
                pairing: report.address() & 0x01 != 0,
                error: report.params()[0],
            }),
            other => Err(ParseError::UnexpectedSubId {
                expected: sub_id::PAIR_STATUS,
                actual: other,
            }),
        }
    }
}

/// Six digit passkey the user types on a device being paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Passkey(pub u32);

impl fmt::Display for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl TryFrom<&Report> for Passkey {
    type Error = ParseError;

    /// Decode a `PasskeyRequest` notification.
    ///
    /// ```
    /// use rxmon_types::{Passkey, Report, ReportType, sub_id};
    ///
    /// let report = Report::new(ReportType::Long, 0xff, sub_id::PASSKEY_REQUEST, 0, b"012345").unwrap();
    /// let passkey = Passkey::try_from(&report).unwrap();
    /// assert_eq!(passkey, Passkey(12345));
    /// assert_eq!(passkey.to_string(), "012345");
    /// ```
    fn try_from(report: &Report) -> ParseResult<Self> {
        report.expect(sub_id::PASSKEY_REQUEST, Some(ReportType::Long))?;
        let digits = &report.params()[..6];
        let mut value = 0u32;
        for digit in digits {
            if !digit.is_ascii_digit() {
                return Err(ParseError::InvalidData(format!(
                    "passkey byte 0x{digit:02x} is not an ASCII digit"
                )));
            }
            value = value * 10 + u32::from(digit - b'0');
        }
        Ok(Passkey(value))
    }
}

/// Longest device name a discovery report can carry.
pub const MAX_DISCOVERY_NAME_LEN: usize = 13;

const INFO_PART: u8 = 0x00;
const NAME_PART: u8 = 0x01;

/// Information about a device found during Bolt discovery.
///
/// A record is assembled from two `DeviceDiscovered` reports (device info
/// and name) sharing one sequence number; see [`DiscoveryRecord::fill`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveryRecord {
    /// Sequence number shared by the parts of this record.
    pub seq: Option<u16>,
    /// Raw device kind code.
    pub device_kind: u8,
    /// Wireless product id.
    pub pid: u16,
    /// Bluetooth address of the device.
    pub address: [u8; 6],
    /// Authentication method the device supports.
    pub authentication: u8,
    /// Advertised name.
    pub name: String,
    has_info: bool,
    has_name: bool,
}

impl DiscoveryRecord {
    /// Whether both the info and the name parts have been received.
    pub fn is_filled(&self) -> bool {
        self.has_info && self.has_name
    }

    /// Merge a `DeviceDiscovered` report into the record.
    ///
    /// A report with a different sequence number than the one being
    /// assembled discards the partial record first. Returns whether the
    /// record is complete afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the report is not a long `DeviceDiscovered`
    /// report, has an unknown part number, or carries an invalid name.
    pub fn fill(&mut self, report: &Report) -> ParseResult<bool> {
        report.expect(sub_id::DEVICE_DISCOVERED, Some(ReportType::Long))?;
        let params = report.params();
        let seq = u16::from_be_bytes([params[0], params[1]]);

        match report.address() {
            INFO_PART | NAME_PART => {}
            other => {
                return Err(ParseError::InvalidData(format!(
                    "unknown discovery part {other}"
                )));
            }
        }

        if self.seq != Some(seq) {
            *self = DiscoveryRecord {
                seq: Some(seq),
                ..Default::default()
            };
        }

        if report.address() == INFO_PART {
            self.device_kind = params[2];
            self.pid = u16::from_le_bytes([params[3], params[4]]);
            self.address.copy_from_slice(&params[5..11]);
            self.authentication = params[11];
            self.has_info = true;
        } else {
            let len = usize::from(params[2]);
            if len > MAX_DISCOVERY_NAME_LEN {
                return Err(ParseError::InvalidData(format!(
                    "device name length {len} exceeds {MAX_DISCOVERY_NAME_LEN}"
                )));
            }
            let name = std::str::from_utf8(&params[3..3 + len])
                .map_err(|e| ParseError::InvalidData(format!("device name: {e}")))?;
            self.name = name.to_string();
            self.has_name = true;
        }

        Ok(self.is_filled())
    }

    /// Bluetooth address formatted as `AA:BB:CC:DD:EE:FF`.
    pub fn address_string(&self) -> String {
        self.address
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Notification groups a receiver can be asked to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NotificationFlags {
    /// Battery status of attached devices.
    pub device_battery_status: bool,
    /// Connection, disconnection and pairing notifications.
    pub receiver_wireless_notifications: bool,
    /// Tell devices host software is present.
    pub receiver_software_present: bool,
}

impl Default for NotificationFlags {
    fn default() -> Self {
        Self {
            device_battery_status: true,
            receiver_wireless_notifications: true,
            receiver_software_present: true,
        }
    }
}

impl NotificationFlags {
    /// Encode as the three parameter bytes of the notification register.
    ///
    /// ```
    /// use rxmon_types::NotificationFlags;
    ///
    /// assert_eq!(NotificationFlags::default().to_params(), [0x00, 0x09, 0x10]);
    /// ```
    #[must_use]
    pub fn to_params(self) -> [u8; 3] {
        let mut flags = 0u32;
        if self.device_battery_status {
            flags |= 1 << 4;
        }
        if self.receiver_wireless_notifications {
            flags |= 1 << 8;
        }
        if self.receiver_software_present {
            flags |= 1 << 11;
        }
        let bytes = flags.to_be_bytes();
        [bytes[1], bytes[2], bytes[3]]
    }
}

/// HID++ 1.0 register access error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorCode {
    /// Sub-id not supported.
    InvalidSubId,
    /// Register address not supported.
    InvalidAddress,
    /// Value out of range.
    InvalidValue,
    /// Connection request failed.
    ConnectFail,
    /// No free device slot.
    TooManyDevices,
    /// Device already paired.
    AlreadyExists,
    /// Receiver busy.
    Busy,
    /// No device at this index.
    UnknownDevice,
    /// Receiver ran out of resources.
    ResourceError,
    /// Request not valid in the current context.
    RequestUnavailable,
    /// Parameter value invalid.
    InvalidParamValue,
    /// Wrong PIN code entered.
    WrongPinCode,
    /// Code not in the table above.
    Unknown(u8),
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => ErrorCode::InvalidSubId,
            0x02 => ErrorCode::InvalidAddress,
            0x03 => ErrorCode::InvalidValue,
            0x04 => ErrorCode::ConnectFail,
            0x05 => ErrorCode::TooManyDevices,
            0x06 => ErrorCode::AlreadyExists,
            0x07 => ErrorCode::Busy,
            0x08 => ErrorCode::UnknownDevice,
            0x09 => ErrorCode::ResourceError,
            0x0A => ErrorCode::RequestUnavailable,
            0x0B => ErrorCode::InvalidParamValue,
            0x0C => ErrorCode::WrongPinCode,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidSubId => write!(f, "invalid sub-id"),
            ErrorCode::InvalidAddress => write!(f, "invalid address"),
            ErrorCode::InvalidValue => write!(f, "invalid value"),
            ErrorCode::ConnectFail => write!(f, "connection failed"),
            ErrorCode::TooManyDevices => write!(f, "too many devices"),
            ErrorCode::AlreadyExists => write!(f, "already exists"),
            ErrorCode::Busy => write!(f, "busy"),
            ErrorCode::UnknownDevice => write!(f, "unknown device"),
            ErrorCode::ResourceError => write!(f, "resource error"),
            ErrorCode::RequestUnavailable => write!(f, "request unavailable"),
            ErrorCode::InvalidParamValue => write!(f, "invalid parameter value"),
            ErrorCode::WrongPinCode => write!(f, "wrong PIN code"),
            ErrorCode::Unknown(code) => write!(f, "unknown error 0x{code:02x}"),
        }
    }
}
