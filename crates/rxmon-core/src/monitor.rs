//! Receiver monitor.
//!
//! [`ReceiverMonitor`] turns the report stream of one receiver into device
//! lifecycle and pairing callbacks on a [`ReceiverHandler`].
//!
//! # Threading
//!
//! Subscription callbacks run on the thread delivering reports, which may
//! be the receiver's own I/O thread. Anything that can block on another
//! register exchange is therefore handed to the [`TaskRunner`]:
//!
//! - connection and disconnection reports always reach
//!   [`ReceiverHandler::add_device`] / [`ReceiverHandler::remove_device`]
//!   from a background task;
//! - the Bolt pairing command sent once discovery completes is issued from
//!   a background task.
//!
//! [`ReceiverHandler::pair_ready`] is called on the delivering thread,
//! after the pairing lock has been released.
//!
//! Background tasks carry no ordering guarantee. A handler may see a
//! removal before the addition it follows and must treat both as
//! idempotent.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rxmon_core::events::{BroadcastHandler, EventDispatcher};
//! use rxmon_core::mock::{MockDeviceMonitor, MockRawDevice, QueuedRunner};
//! use rxmon_core::monitor::{MonitorOptions, ReceiverMonitor};
//!
//! let devices = MockDeviceMonitor::new();
//! let raw = devices.insert(MockRawDevice::new("/dev/hidraw0"));
//! let dispatcher = EventDispatcher::default();
//! let mut events = dispatcher.subscribe();
//! let runner = Arc::new(QueuedRunner::new());
//!
//! let monitor = ReceiverMonitor::new(
//!     "/dev/hidraw0",
//!     &devices,
//!     MonitorOptions::default(),
//!     Arc::new(BroadcastHandler::new(dispatcher)),
//!     runner.clone(),
//! )
//! .unwrap();
//! monitor.ready().unwrap();
//!
//! raw.inject(&[0x10, 0x01, 0x41, 0x04, 0x02, 0x2a, 0x40]);
//! runner.run_pending();
//! assert!(events.try_recv().is_ok());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use rxmon_types::{
    ConnectionEvent, DeviceIndex, DisconnectionEvent, DiscoveryRecord, DiscoveryStatus,
    NotificationFlags, PairStatus, Passkey, Report, ReportType, sub_id,
};
use rxmon_types::report::offset;

use crate::error::{Error, Result};
use crate::handlers::{EventHandler, HandlerLock};
use crate::pairing::{PairState, PairingMachine};
use crate::raw::DeviceMonitor;
use crate::receiver::{Receiver, ReceiverKind};
use crate::task::TaskRunner;

/// Default timeout for register exchanges.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Consumer of the events a [`ReceiverMonitor`] produces.
///
/// `add_device` and `remove_device` run on background tasks and may
/// perform synchronous exchanges with the receiver. A returned error is
/// logged and otherwise ignored.
pub trait ReceiverHandler: Send + Sync {
    /// A device attached, or was found by enumeration or
    /// [`ReceiverMonitor::wait_for_device`].
    fn add_device(&self, receiver: &Arc<Receiver>, event: ConnectionEvent) -> Result<()>;

    /// A device detached.
    fn remove_device(&self, receiver: &Arc<Receiver>, event: DisconnectionEvent) -> Result<()>;

    /// The receiver wants the user to type `passkey` on the discovered
    /// device.
    fn pair_ready(&self, receiver: &Arc<Receiver>, record: &DiscoveryRecord, passkey: Passkey);
}

/// The report subscriptions a monitor maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Raw connection and disconnection reports.
    Lifecycle,
    /// Bolt device discovery reports.
    Discovery,
    /// Bolt passkey requests.
    Passkey,
    /// Discovery and pairing status reports.
    PairStatus,
}

impl SubscriptionKind {
    /// Every kind, in registration order.
    pub const ALL: [SubscriptionKind; 4] = [
        SubscriptionKind::Lifecycle,
        SubscriptionKind::Discovery,
        SubscriptionKind::Passkey,
        SubscriptionKind::PairStatus,
    ];
}

/// Options for opening a monitored receiver.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Timeout for register exchanges.
    pub timeout: Duration,
    /// Force a receiver kind instead of detecting it from the product id.
    pub kind: Option<ReceiverKind>,
    /// Notifications enabled on construction.
    pub notifications: NotificationFlags,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            kind: None,
            notifications: NotificationFlags::default(),
        }
    }
}

impl MonitorOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options with a timeout given in (fractional) seconds.
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| Error::InvalidConfig(format!("timeout {}: {}", secs, e)))?;
        let options = Self::default().timeout(timeout);
        options.validate()?;
        Ok(options)
    }

    /// Set the register exchange timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Force the receiver kind.
    pub fn kind(mut self, kind: ReceiverKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the notifications to enable.
    pub fn notifications(mut self, flags: NotificationFlags) -> Self {
        self.notifications = flags;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

struct Inner {
    receiver: Arc<Receiver>,
    handler: Arc<dyn ReceiverHandler>,
    runner: Arc<dyn TaskRunner>,
    pairing: PairingMachine,
    subscriptions: Mutex<HashMap<SubscriptionKind, HandlerLock>>,
    waits: Mutex<HashMap<u64, HandlerLock>>,
    next_wait: AtomicU64,
}

impl Inner {
    /// Run `work` on the task runner if the monitor still exists by then.
    fn offload<F>(self: &Arc<Self>, work: F)
    where
        F: FnOnce(&Inner) + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.runner.spawn(Box::new(move || match weak.upgrade() {
            Some(inner) => work(&inner),
            None => trace!("Monitor dropped before background task ran"),
        }));
    }

    fn add_device(&self, index: DeviceIndex, event: Result<ConnectionEvent>) {
        let result = event.and_then(|event| self.handler.add_device(&self.receiver, event));
        if let Err(e) = result {
            error!(
                "Failed to add device {} to receiver on {}: {}",
                index,
                self.receiver.path(),
                e
            );
        }
    }

    fn remove_device(&self, index: DeviceIndex, event: Result<DisconnectionEvent>) {
        let result = event.and_then(|event| self.handler.remove_device(&self.receiver, event));
        if let Err(e) = result {
            error!(
                "Failed to remove device {} from receiver on {}: {}",
                index,
                self.receiver.path(),
                e
            );
        }
    }

    fn lifecycle(&self, report: &Report) {
        let index = report.device_index();
        match report.sub_id() {
            sub_id::DEVICE_CONNECTION => {
                self.add_device(index, ConnectionEvent::try_from(report).map_err(Error::from))
            }
            sub_id::DEVICE_DISCONNECTION => {
                self.remove_device(index, DisconnectionEvent::try_from(report).map_err(Error::from))
            }
            _ => {}
        }
    }

    fn subscribe(self: &Arc<Self>, kind: SubscriptionKind) -> HandlerLock {
        let weak = Arc::downgrade(self);
        match kind {
            SubscriptionKind::Lifecycle => self.receiver.raw_device().add_event_handler(
                EventHandler::new(is_lifecycle_frame, move |frame: &[u8]| {
                    let Some(inner) = weak.upgrade() else { return };
                    match Report::from_bytes(frame) {
                        Ok(report) => inner.offload(move |inner| inner.lifecycle(&report)),
                        Err(e) => debug!("Skipping lifecycle frame: {}", e),
                    }
                }),
            ),
            SubscriptionKind::Discovery => self.receiver.add_event_handler(EventHandler::new(
                |report: &Report| {
                    report.sub_id() == sub_id::DEVICE_DISCOVERED
                        && report.report_type() == ReportType::Long
                },
                move |report: &Report| {
                    let Some(inner) = weak.upgrade() else { return };
                    match inner.pairing.device_discovered(report) {
                        Ok(Some(record)) => {
                            debug!(
                                "Discovered {} ({}) on {}, starting pairing",
                                record.name,
                                record.address_string(),
                                inner.receiver.path()
                            );
                            inner.offload(move |inner| {
                                if let Err(e) = inner.receiver.start_bolt_pairing(&record) {
                                    error!(
                                        "Failed to pair {} on receiver {}: {}",
                                        record.address_string(),
                                        inner.receiver.path(),
                                        e
                                    );
                                }
                            });
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Invalid discovery report on {}: {}", inner.receiver.path(), e),
                    }
                },
            )),
            SubscriptionKind::Passkey => self.receiver.add_event_handler(EventHandler::new(
                |report: &Report| {
                    report.sub_id() == sub_id::PASSKEY_REQUEST
                        && report.report_type() == ReportType::Long
                },
                move |report: &Report| {
                    let Some(inner) = weak.upgrade() else { return };
                    let passkey = match Passkey::try_from(report) {
                        Ok(passkey) => passkey,
                        Err(e) => {
                            warn!("Invalid passkey request on {}: {}", inner.receiver.path(), e);
                            return;
                        }
                    };
                    if let Some(record) = inner.pairing.passkey_requested() {
                        inner.handler.pair_ready(&inner.receiver, &record, passkey);
                    }
                },
            )),
            SubscriptionKind::PairStatus => self.receiver.add_event_handler(EventHandler::new(
                |report: &Report| {
                    matches!(
                        report.sub_id(),
                        sub_id::DISCOVERY_STATUS | sub_id::PAIR_STATUS | sub_id::BOLT_PAIR_STATUS
                    )
                },
                move |report: &Report| {
                    let Some(inner) = weak.upgrade() else { return };
                    let ended = if report.sub_id() == sub_id::DISCOVERY_STATUS {
                        DiscoveryStatus::try_from(report)
                            .map(|status| inner.pairing.discovery_status(&status))
                    } else {
                        PairStatus::try_from(report).map(|status| inner.pairing.pair_status(&status))
                    };
                    if let Ok(true) = ended {
                        debug!("Receiver on {} ended pairing", inner.receiver.path());
                    }
                },
            )),
        }
    }
}

fn is_lifecycle_frame(frame: &[u8]) -> bool {
    matches!(frame.get(offset::TYPE).copied(), Some(0x10 | 0x11))
        && matches!(
            frame.get(offset::SUB_ID).copied(),
            Some(sub_id::DEVICE_CONNECTION | sub_id::DEVICE_DISCONNECTION)
        )
}

/// Monitors one receiver for device lifecycle and pairing events.
pub struct ReceiverMonitor {
    inner: Arc<Inner>,
}

impl ReceiverMonitor {
    /// Open the receiver at `path` and enable its notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, the device cannot be
    /// opened, or the receiver rejects the notification settings.
    pub fn new(
        path: &str,
        devices: &dyn DeviceMonitor,
        options: MonitorOptions,
        handler: Arc<dyn ReceiverHandler>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        options.validate()?;
        let raw = devices.open(path)?;
        let kind = options
            .kind
            .unwrap_or_else(|| ReceiverKind::from_product_id(raw.product_id()));
        let receiver = Arc::new(Receiver::new(raw, kind, options.timeout));
        Self::build(receiver, options.notifications, handler, runner)
    }

    /// Monitor an already opened receiver with default notifications.
    pub fn with_receiver(
        receiver: Arc<Receiver>,
        handler: Arc<dyn ReceiverHandler>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        Self::build(receiver, NotificationFlags::default(), handler, runner)
    }

    fn build(
        receiver: Arc<Receiver>,
        notifications: NotificationFlags,
        handler: Arc<dyn ReceiverHandler>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        receiver.set_notifications(notifications)?;
        info!("Monitoring {} receiver on {}", receiver.kind(), receiver.path());

        Ok(Self {
            inner: Arc::new(Inner {
                receiver,
                handler,
                runner,
                pairing: PairingMachine::new(),
                subscriptions: Mutex::new(HashMap::new()),
                waits: Mutex::new(HashMap::new()),
                next_wait: AtomicU64::new(0),
            }),
        })
    }

    /// Register any missing subscription, then enumerate attached devices.
    ///
    /// Calling this again never registers a subscription twice.
    pub fn ready(&self) -> Result<()> {
        {
            let mut subscriptions = self
                .inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for kind in SubscriptionKind::ALL {
                let active = subscriptions
                    .get(&kind)
                    .is_some_and(HandlerLock::is_active);
                if !active {
                    debug!("Subscribing to {:?} reports on {}", kind, self.inner.receiver.path());
                    subscriptions.insert(kind, self.inner.subscribe(kind));
                }
            }
        }
        self.enumerate()
    }

    /// Ask the receiver to report every attached device.
    ///
    /// Devices arrive through the regular connection path.
    pub fn enumerate(&self) -> Result<()> {
        self.inner.receiver.enumerate()
    }

    /// Add device `index` as soon as any report from it is seen.
    ///
    /// Recovers devices that linked before monitoring started and so never
    /// sent a connection notification. Fires at most once; the pending
    /// registration lives until then or until the monitor is dropped.
    pub fn wait_for_device(&self, index: DeviceIndex) {
        let id = self.inner.next_wait.fetch_add(1, Ordering::Relaxed);
        let fired = Arc::new(AtomicBool::new(false));
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let callback_fired = Arc::clone(&fired);
        let lock = self
            .inner
            .receiver
            .raw_device()
            .add_event_handler(EventHandler::new(
                move |frame: &[u8]| frame.get(offset::DEVICE_INDEX) == Some(&index),
                move |_: &[u8]| {
                    if callback_fired.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    let Some(inner) = weak.upgrade() else { return };
                    let lock = inner
                        .waits
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);
                    drop(lock);

                    debug!("Device {} seen on {}", index, inner.receiver.path());
                    inner.offload(move |inner| {
                        inner.add_device(index, Ok(ConnectionEvent::synthesized(index)))
                    });
                },
            ));

        let mut waits = self.inner.waits.lock().unwrap_or_else(PoisonError::into_inner);
        if !fired.load(Ordering::SeqCst) {
            waits.insert(id, lock);
        }
    }

    /// Start a pairing attempt.
    ///
    /// Bolt receivers start discovery for `timeout` seconds, legacy
    /// receivers open their pairing lock for `timeout` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PairingInProgress`] if an attempt is already
    /// running, or the start command's error (the attempt is then
    /// abandoned).
    ///
    /// An attempt only ends on a stop report from the receiver or on
    /// [`stop_pair`](Self::stop_pair). If the receiver never reports that
    /// pairing closed, call `stop_pair` before retrying.
    pub fn start_pair(&self, timeout: u8) -> Result<()> {
        let receiver = &self.inner.receiver;
        let entered = self.inner.pairing.begin(receiver.kind())?;

        let result = match entered {
            PairState::Discovering => receiver.start_discover(timeout),
            _ => receiver.start_pairing(timeout),
        };
        match result {
            Ok(()) => {
                info!("Pairing started on {} ({})", receiver.path(), entered);
                Ok(())
            }
            Err(e) => {
                self.inner.pairing.revert(entered);
                Err(e)
            }
        }
    }

    /// Stop any pairing attempt.
    ///
    /// The state is `NotPairing` when this returns, even if the stop
    /// command fails.
    pub fn stop_pair(&self) -> Result<()> {
        let receiver = &self.inner.receiver;
        let previous = self.inner.pairing.stop();
        debug!("Stopping pairing on {} (was {})", receiver.path(), previous);
        match previous {
            PairState::Discovering => receiver.stop_discover(),
            PairState::FindingPasskey | PairState::Pairing => receiver.stop_pairing(),
            PairState::NotPairing => Ok(()),
        }
    }

    /// The monitored receiver.
    pub fn receiver(&self) -> &Arc<Receiver> {
        &self.inner.receiver
    }

    /// Current pairing state.
    pub fn pair_state(&self) -> PairState {
        self.inner.pairing.state()
    }

    /// Whether the given subscription is registered.
    pub fn is_subscribed(&self, kind: SubscriptionKind) -> bool {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .is_some_and(HandlerLock::is_active)
    }

    /// Number of [`wait_for_device`](Self::wait_for_device) registrations
    /// that have not fired yet.
    pub fn pending_waits(&self) -> usize {
        self.inner
            .waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for ReceiverMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverMonitor")
            .field("receiver", &self.inner.receiver)
            .field("pair_state", &self.pair_state())
            .finish_non_exhaustive()
    }
}
