//! HID++ 1.0 report framing.
//!
//! Every frame exchanged with a receiver starts with a four byte header:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | Report type (`0x10` short, `0x11` long) |
//! | 1 | Device index (`0xFF` for the receiver itself) |
//! | 2 | Sub-identifier |
//! | 3 | Address (register or notification specific) |
//!
//! followed by 3 (short) or 16 (long) parameter bytes.

use core::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ParseError, ParseResult};

/// Byte offsets inside a raw HID++ frame.
pub mod offset {
    /// Report type byte.
    pub const TYPE: usize = 0;
    /// Device index byte.
    pub const DEVICE_INDEX: usize = 1;
    /// Sub-identifier byte.
    pub const SUB_ID: usize = 2;
    /// Address byte.
    pub const ADDRESS: usize = 3;
    /// First parameter byte.
    pub const PARAMETERS: usize = 4;
}

/// Sub-identifiers of receiver notifications and register access.
pub mod sub_id {
    /// A paired device went out of range or was unpaired.
    pub const DEVICE_DISCONNECTION: u8 = 0x40;
    /// A paired device linked (or was reported by enumeration).
    pub const DEVICE_CONNECTION: u8 = 0x41;
    /// Legacy (Unifying) pairing lock status changed.
    pub const PAIR_STATUS: u8 = 0x4A;
    /// Bolt receiver asks the user to type a passkey.
    pub const PASSKEY_REQUEST: u8 = 0x4D;
    /// Bolt receiver found a device while discovering.
    pub const DEVICE_DISCOVERED: u8 = 0x4F;
    /// Bolt discovery started or stopped.
    pub const DISCOVERY_STATUS: u8 = 0x53;
    /// Bolt pairing status changed.
    pub const BOLT_PAIR_STATUS: u8 = 0x54;
    /// Write a short register.
    pub const SET_REGISTER_SHORT: u8 = 0x80;
    /// Read a short register.
    pub const GET_REGISTER_SHORT: u8 = 0x81;
    /// Write a long register.
    pub const SET_REGISTER_LONG: u8 = 0x82;
    /// Read a long register.
    pub const GET_REGISTER_LONG: u8 = 0x83;
    /// Register access failed.
    pub const ERROR_MESSAGE: u8 = 0x8F;
}

/// Receiver register addresses.
pub mod register {
    /// HID++ notification enable flags.
    pub const ENABLE_NOTIFICATIONS: u8 = 0x00;
    /// Connection state; writing `0x02` replays arrival notifications.
    pub const CONNECTION_STATE: u8 = 0x02;
    /// Unifying pairing lock control.
    pub const DEVICE_PAIRING: u8 = 0xB2;
    /// Bolt device discovery control.
    pub const BOLT_DISCOVERY: u8 = 0xC0;
    /// Bolt pairing control.
    pub const BOLT_PAIRING: u8 = 0xC1;
}

/// Device index addressing the receiver itself.
pub const RECEIVER_INDEX: DeviceIndex = 0xFF;

/// Index of a device slot on a receiver.
pub type DeviceIndex = u8;

/// HID++ report type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ReportType {
    /// 7 byte report.
    Short = 0x10,
    /// 20 byte report.
    Long = 0x11,
}

impl ReportType {
    /// Total frame length for this report type.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            ReportType::Short => 7,
            ReportType::Long => 20,
        }
    }

    /// Number of parameter bytes after the header.
    #[must_use]
    pub const fn param_len(self) -> usize {
        self.len() - offset::PARAMETERS
    }
}

impl TryFrom<u8> for ReportType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(ReportType::Short),
            0x11 => Ok(ReportType::Long),
            other => Err(ParseError::UnknownReportType(other)),
        }
    }
}

/// An immutable, decoded HID++ frame.
///
/// Cloning is cheap: the frame bytes are reference counted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Report {
    bytes: Bytes,
}

impl Report {
    /// Parse a report from raw bytes.
    ///
    /// Trailing bytes beyond the report type's length are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownReportType`] if the first byte is not a
    /// HID++ report type, or [`ParseError::InsufficientBytes`] if the frame
    /// is shorter than its type requires.
    ///
    /// # Examples
    ///
    /// ```
    /// use rxmon_types::{Report, ReportType, sub_id};
    ///
    /// let report = Report::from_bytes(&[0x10, 0x01, 0x41, 0x04, 0x61, 0x2a, 0x40]).unwrap();
    /// assert_eq!(report.report_type(), ReportType::Short);
    /// assert_eq!(report.device_index(), 1);
    /// assert_eq!(report.sub_id(), sub_id::DEVICE_CONNECTION);
    /// ```
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        let first = *data.first().ok_or(ParseError::InsufficientBytes {
            expected: ReportType::Short.len(),
            actual: 0,
        })?;
        let report_type = ReportType::try_from(first)?;
        if data.len() < report_type.len() {
            return Err(ParseError::InsufficientBytes {
                expected: report_type.len(),
                actual: data.len(),
            });
        }
        Ok(Self {
            bytes: Bytes::copy_from_slice(&data[..report_type.len()]),
        })
    }

    /// Build an outgoing report, zero-padding the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::TooManyParams`] if `params` does not fit.
    pub fn new(
        report_type: ReportType,
        device_index: DeviceIndex,
        sub_id: u8,
        address: u8,
        params: &[u8],
    ) -> ParseResult<Self> {
        if params.len() > report_type.param_len() {
            return Err(ParseError::TooManyParams {
                len: params.len(),
                max: report_type.param_len(),
            });
        }
        let mut buf = BytesMut::with_capacity(report_type.len());
        buf.put_u8(report_type as u8);
        buf.put_u8(device_index);
        buf.put_u8(sub_id);
        buf.put_u8(address);
        buf.put_slice(params);
        buf.resize(report_type.len(), 0);
        Ok(Self {
            bytes: buf.freeze(),
        })
    }

    /// Report type.
    pub fn report_type(&self) -> ReportType {
        if self.bytes[offset::TYPE] == ReportType::Long as u8 {
            ReportType::Long
        } else {
            ReportType::Short
        }
    }

    /// Device index the report concerns.
    pub fn device_index(&self) -> DeviceIndex {
        self.bytes[offset::DEVICE_INDEX]
    }

    /// Sub-identifier.
    pub fn sub_id(&self) -> u8 {
        self.bytes[offset::SUB_ID]
    }

    /// Address byte.
    pub fn address(&self) -> u8 {
        self.bytes[offset::ADDRESS]
    }

    /// Parameter bytes following the header.
    pub fn params(&self) -> &[u8] {
        &self.bytes[offset::PARAMETERS..]
    }

    /// The whole frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether this report is an error response to a register access.
    pub fn is_error(&self) -> bool {
        self.sub_id() == sub_id::ERROR_MESSAGE
    }

    pub(crate) fn expect(&self, expected_sub_id: u8, report_type: Option<ReportType>) -> ParseResult<()> {
        if self.sub_id() != expected_sub_id {
            return Err(ParseError::UnexpectedSubId {
                expected: expected_sub_id,
                actual: self.sub_id(),
            });
        }
        match report_type {
            Some(required) if required != self.report_type() => {
                Err(ParseError::UnexpectedReportType(self.report_type()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("type", &self.report_type())
            .field("index", &self.device_index())
            .field("sub_id", &format_args!("0x{:02x}", self.sub_id()))
            .field("address", &format_args!("0x{:02x}", self.address()))
            .field("params", &HexBytes(self.params()))
            .finish()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HexBytes(&self.bytes))
    }
}

struct HexBytes<'a>(&'a [u8]);

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Parse a whitespace/colon separated (or contiguous) hex string into bytes.
///
/// ```
/// use rxmon_types::report::parse_hex;
///
/// assert_eq!(parse_hex("10 ff 80").unwrap(), vec![0x10, 0xff, 0x80]);
/// assert_eq!(parse_hex("10ff80").unwrap(), vec![0x10, 0xff, 0x80]);
/// ```
pub fn parse_hex(input: &str) -> ParseResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(ParseError::InvalidData(format!(
            "odd number of hex digits in '{}'",
            input.trim()
        )));
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair)
                .map_err(|_| ParseError::InvalidData("non-ASCII hex digit".to_string()))?;
            u8::from_str_radix(text, 16)
                .map_err(|_| ParseError::InvalidData(format!("invalid hex byte '{text}'")))
        })
        .collect()
}
