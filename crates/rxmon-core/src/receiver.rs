//! HID++ 1.0 receiver protocol client.
//!
//! [`Receiver`] wraps a [`RawDevice`], decodes inbound frames into
//! [`Report`]s for its own subscribers, and encodes the register writes
//! that drive notifications, enumeration, discovery and pairing.
//!
//! Register access is synchronous: the calling thread blocks until the
//! receiver answers or the timeout expires. It must therefore never be
//! called from a handler running on the transport's I/O thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use rxmon_types::{
    DiscoveryRecord, ErrorCode, NotificationFlags, RECEIVER_INDEX, Report, ReportType, register,
    sub_id,
};

use crate::error::{Error, Result};
use crate::handlers::{EventHandler, EventHandlers, HandlerLock};
use crate::raw::{DeviceMonitor, RawDevice};

/// USB product id of Bolt receivers.
pub const BOLT_PRODUCT_ID: u16 = 0xC548;

/// Device number requested when opening the Unifying pairing lock.
const UNIFYING_PAIRING_SLOT: u8 = 0x53;

/// Entropy length requested for Bolt passkey pairing.
const BOLT_PAIRING_ENTROPY: u8 = 0x14;

/// Receiver protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverKind {
    /// Unifying and other legacy receivers: pairing opens a lock directly.
    Unifying,
    /// Bolt receivers: pairing starts with discovery and a passkey exchange.
    Bolt,
}

impl ReceiverKind {
    /// Detect the protocol family from the USB product id.
    pub fn from_product_id(product_id: u16) -> Self {
        if product_id == BOLT_PRODUCT_ID {
            ReceiverKind::Bolt
        } else {
            ReceiverKind::Unifying
        }
    }
}

impl fmt::Display for ReceiverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverKind::Unifying => write!(f, "unifying"),
            ReceiverKind::Bolt => write!(f, "bolt"),
        }
    }
}

impl std::str::FromStr for ReceiverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unifying" | "legacy" => Ok(ReceiverKind::Unifying),
            "bolt" => Ok(ReceiverKind::Bolt),
            other => Err(Error::InvalidConfig(format!(
                "unknown receiver kind '{}' (expected 'unifying' or 'bolt')",
                other
            ))),
        }
    }
}

/// Client for one wireless receiver.
pub struct Receiver {
    raw: Arc<dyn RawDevice>,
    kind: ReceiverKind,
    timeout: Duration,
    handlers: Arc<EventHandlers<Report>>,
    _raw_lock: HandlerLock,
}

impl Receiver {
    /// Open the receiver at `path`, detecting its kind from the product id.
    pub fn open(path: &str, monitor: &dyn DeviceMonitor, timeout: Duration) -> Result<Self> {
        let raw = monitor.open(path)?;
        let kind = ReceiverKind::from_product_id(raw.product_id());
        Ok(Self::new(raw, kind, timeout))
    }

    /// Wrap an already opened raw device.
    pub fn new(raw: Arc<dyn RawDevice>, kind: ReceiverKind, timeout: Duration) -> Self {
        let handlers = Arc::new(EventHandlers::<Report>::new());

        let forward = Arc::clone(&handlers);
        let path = raw.path().to_string();
        let raw_lock = raw.add_event_handler(EventHandler::new(
            |frame: &[u8]| matches!(frame.first().copied(), Some(0x10 | 0x11)),
            move |frame: &[u8]| match Report::from_bytes(frame) {
                Ok(report) => forward.dispatch(&report),
                Err(e) => trace!("Ignoring frame from {}: {}", path, e),
            },
        ));

        debug!("Opened {} receiver on {}", kind, raw.path());

        Self {
            raw,
            kind,
            timeout,
            handlers,
            _raw_lock: raw_lock,
        }
    }

    /// The underlying raw device.
    pub fn raw_device(&self) -> &Arc<dyn RawDevice> {
        &self.raw
    }

    /// Host path of the receiver.
    pub fn path(&self) -> &str {
        self.raw.path()
    }

    /// Protocol family.
    pub fn kind(&self) -> ReceiverKind {
        self.kind
    }

    /// Whether this is a Bolt receiver.
    pub fn is_bolt(&self) -> bool {
        self.kind == ReceiverKind::Bolt
    }

    /// Timeout applied to register exchanges.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a handler for decoded reports.
    pub fn add_event_handler(&self, handler: EventHandler<Report>) -> HandlerLock {
        self.handlers.add(handler)
    }

    /// Number of handlers registered for decoded reports.
    pub fn event_handler_count(&self) -> usize {
        self.handlers.len()
    }

    // --- Register access ---

    /// Write a receiver register and wait for the acknowledgement.
    pub fn set_register(&self, address: u8, params: &[u8], long: bool) -> Result<Report> {
        let sub = if long {
            sub_id::SET_REGISTER_LONG
        } else {
            sub_id::SET_REGISTER_SHORT
        };
        self.access_register(sub, address, params, long)
    }

    /// Read a receiver register.
    pub fn get_register(&self, address: u8, params: &[u8], long: bool) -> Result<Report> {
        let sub = if long {
            sub_id::GET_REGISTER_LONG
        } else {
            sub_id::GET_REGISTER_SHORT
        };
        // Reads of long registers are requested with a short frame.
        self.access_register(sub, address, params, false)
    }

    fn access_register(&self, sub: u8, address: u8, params: &[u8], long: bool) -> Result<Report> {
        let report_type = if long {
            ReportType::Long
        } else {
            ReportType::Short
        };
        let request = Report::new(report_type, RECEIVER_INDEX, sub, address, params)?;

        let (tx, rx) = bounded::<Report>(1);
        let _response = self.handlers.add(EventHandler::new(
            move |report: &Report| {
                report.device_index() == RECEIVER_INDEX
                    && ((report.sub_id() == sub && report.address() == address)
                        || (report.is_error()
                            && report.address() == sub
                            && report.params()[0] == address))
            },
            move |report: &Report| {
                let _ = tx.try_send(report.clone());
            },
        ));

        trace!("Sending {} to {}", request, self.path());
        self.raw.send_report(request.as_bytes())?;

        let response = match rx.recv_timeout(self.timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::timeout(
                    format!("register 0x{:02x} (sub-id 0x{:02x})", address, sub),
                    self.timeout,
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Disconnected(self.path().to_string()));
            }
        };

        if response.is_error() {
            return Err(Error::Protocol {
                sub_id: sub,
                address,
                code: ErrorCode::from(response.params()[1]),
            });
        }
        Ok(response)
    }

    // --- Commands ---

    /// Choose which notifications the receiver reports.
    pub fn set_notifications(&self, flags: NotificationFlags) -> Result<()> {
        self.set_register(register::ENABLE_NOTIFICATIONS, &flags.to_params(), false)?;
        Ok(())
    }

    /// Ask the receiver to report every attached device with a connection
    /// notification.
    pub fn enumerate(&self) -> Result<()> {
        self.set_register(register::CONNECTION_STATE, &[0x02], false)?;
        Ok(())
    }

    /// Start Bolt device discovery for `timeout` seconds.
    pub fn start_discover(&self, timeout: u8) -> Result<()> {
        self.require_bolt("discovery")?;
        self.set_register(register::BOLT_DISCOVERY, &[timeout, 0x01], true)?;
        Ok(())
    }

    /// Cancel Bolt device discovery.
    pub fn stop_discover(&self) -> Result<()> {
        self.require_bolt("discovery")?;
        self.set_register(register::BOLT_DISCOVERY, &[0x00, 0x02], true)?;
        Ok(())
    }

    /// Open the legacy pairing lock for `timeout` seconds.
    pub fn start_pairing(&self, timeout: u8) -> Result<()> {
        if self.is_bolt() {
            return Err(Error::NotSupported(
                "Bolt receivers pair through discovery".to_string(),
            ));
        }
        self.set_register(
            register::DEVICE_PAIRING,
            &[0x01, UNIFYING_PAIRING_SLOT, timeout],
            false,
        )?;
        Ok(())
    }

    /// Close the pairing lock or cancel a Bolt pairing.
    pub fn stop_pairing(&self) -> Result<()> {
        if self.is_bolt() {
            self.set_register(register::BOLT_PAIRING, &[0x02], true)?;
        } else {
            self.set_register(register::DEVICE_PAIRING, &[0x02, 0x00, 0x00], false)?;
        }
        Ok(())
    }

    /// Pair the device described by a completed discovery record.
    pub fn start_bolt_pairing(&self, record: &DiscoveryRecord) -> Result<()> {
        self.require_bolt("passkey pairing")?;
        let mut params = Vec::with_capacity(9);
        params.push(0x01);
        params.extend_from_slice(&record.address);
        params.push(record.authentication);
        params.push(BOLT_PAIRING_ENTROPY);
        self.set_register(register::BOLT_PAIRING, &params, true)?;
        Ok(())
    }

    fn require_bolt(&self, operation: &str) -> Result<()> {
        if self.is_bolt() {
            Ok(())
        } else {
            Err(Error::NotSupported(format!(
                "{} requires a Bolt receiver",
                operation
            )))
        }
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("path", &self.path())
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDeviceMonitor, MockRawDevice, RegisterReply};
    use std::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn receiver(kind: ReceiverKind) -> (Arc<MockRawDevice>, Receiver) {
        let raw = Arc::new(MockRawDevice::new("/dev/hidraw0"));
        let receiver = Receiver::new(raw.clone(), kind, TIMEOUT);
        (raw, receiver)
    }

    #[test]
    fn test_kind_from_product_id() {
        assert_eq!(ReceiverKind::from_product_id(0xC548), ReceiverKind::Bolt);
        assert_eq!(ReceiverKind::from_product_id(0xC52B), ReceiverKind::Unifying);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Bolt".parse::<ReceiverKind>().unwrap(), ReceiverKind::Bolt);
        assert_eq!("legacy".parse::<ReceiverKind>().unwrap(), ReceiverKind::Unifying);
        assert!("nano".parse::<ReceiverKind>().is_err());
    }

    #[test]
    fn test_open_detects_bolt() {
        let monitor = MockDeviceMonitor::new();
        monitor.insert(MockRawDevice::with_product_id("/dev/hidraw3", BOLT_PRODUCT_ID));
        let receiver = Receiver::open("/dev/hidraw3", &monitor, TIMEOUT).unwrap();
        assert!(receiver.is_bolt());
        assert_eq!(receiver.path(), "/dev/hidraw3");
    }

    #[test]
    fn test_open_missing_device() {
        let monitor = MockDeviceMonitor::new();
        let err = Receiver::open("/dev/hidraw9", &monitor, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[test]
    fn test_decoded_reports_reach_handlers() {
        let (raw, receiver) = receiver(ReceiverKind::Unifying);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _lock = receiver.add_event_handler(EventHandler::new(
            |r: &Report| r.sub_id() == sub_id::DEVICE_CONNECTION,
            move |r: &Report| sink.lock().unwrap().push(r.device_index()),
        ));

        raw.inject(&[0x10, 0x02, 0x41, 0x04, 0x02, 0x2a, 0x40]);
        raw.inject(&[0x20, 0x02, 0x41]); // DJ report, not HID++
        raw.inject(&[0x10, 0x02]); // truncated

        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_set_notifications_frame() {
        let (raw, receiver) = receiver(ReceiverKind::Unifying);
        receiver.set_notifications(NotificationFlags::default()).unwrap();
        assert_eq!(
            raw.sent(),
            vec![vec![0x10, 0xff, 0x80, 0x00, 0x00, 0x09, 0x10]]
        );
    }

    #[test]
    fn test_enumerate_frame() {
        let (raw, receiver) = receiver(ReceiverKind::Unifying);
        receiver.enumerate().unwrap();
        assert_eq!(raw.sent(), vec![vec![0x10, 0xff, 0x80, 0x02, 0x02, 0x00, 0x00]]);
    }

    #[test]
    fn test_legacy_pairing_frames() {
        let (raw, receiver) = receiver(ReceiverKind::Unifying);
        receiver.start_pairing(30).unwrap();
        receiver.stop_pairing().unwrap();
        assert_eq!(
            raw.sent(),
            vec![
                vec![0x10, 0xff, 0x80, 0xb2, 0x01, 0x53, 30],
                vec![0x10, 0xff, 0x80, 0xb2, 0x02, 0x00, 0x00],
            ]
        );
    }

    #[test]
    fn test_bolt_discovery_frames() {
        let (raw, receiver) = receiver(ReceiverKind::Bolt);
        receiver.start_discover(20).unwrap();
        receiver.stop_discover().unwrap();
        let sent = raw.sent();
        assert_eq!(&sent[0][..6], &[0x11, 0xff, 0x82, 0xc0, 20, 0x01]);
        assert_eq!(&sent[1][..6], &[0x11, 0xff, 0x82, 0xc0, 0x00, 0x02]);
        assert_eq!(sent[0].len(), 20);
    }

    #[test]
    fn test_bolt_pairing_frame() {
        let (raw, receiver) = receiver(ReceiverKind::Bolt);
        let mut record = DiscoveryRecord::default();
        record.address = [1, 2, 3, 4, 5, 6];
        record.authentication = 0x01;
        receiver.start_bolt_pairing(&record).unwrap();
        receiver.stop_pairing().unwrap();
        let sent = raw.sent();
        assert_eq!(
            &sent[0][..13],
            &[0x11, 0xff, 0x82, 0xc1, 0x01, 1, 2, 3, 4, 5, 6, 0x01, 0x14]
        );
        assert_eq!(&sent[1][..5], &[0x11, 0xff, 0x82, 0xc1, 0x02]);
    }

    #[test]
    fn test_variant_mismatch_is_not_supported() {
        let (raw, legacy) = receiver(ReceiverKind::Unifying);
        assert!(matches!(legacy.start_discover(10), Err(Error::NotSupported(_))));
        assert!(matches!(
            legacy.start_bolt_pairing(&DiscoveryRecord::default()),
            Err(Error::NotSupported(_))
        ));
        assert!(raw.sent().is_empty());

        let (_, bolt) = receiver(ReceiverKind::Bolt);
        assert!(matches!(bolt.start_pairing(10), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_register_error_response() {
        let (raw, receiver) = receiver(ReceiverKind::Unifying);
        raw.set_reply(register::DEVICE_PAIRING, RegisterReply::Error(0x07));
        let err = receiver.start_pairing(30).unwrap_err();
        match err {
            Error::Protocol {
                sub_id,
                address,
                code,
            } => {
                assert_eq!(sub_id, 0x80);
                assert_eq!(address, 0xb2);
                assert_eq!(code, ErrorCode::Busy);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_register_timeout() {
        let (raw, receiver) = receiver(ReceiverKind::Unifying);
        raw.set_reply(register::CONNECTION_STATE, RegisterReply::Silent);
        let err = receiver.enumerate().unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.to_string().contains("register 0x02"));
        // The one-shot response handler is gone again.
        assert_eq!(receiver.event_handler_count(), 0);
    }

    #[test]
    fn test_get_register_long_uses_short_request() {
        let (raw, receiver) = receiver(ReceiverKind::Bolt);
        let response = receiver.get_register(0xb5, &[0x20], true).unwrap();
        assert_eq!(response.sub_id(), sub_id::GET_REGISTER_LONG);
        assert_eq!(raw.sent()[0][..5], [0x10, 0xff, 0x83, 0xb5, 0x20]);
    }
}
