//! Mock transport implementation for testing.
//!
//! This module provides in-memory stand-ins for the pieces a monitor talks
//! to, so receivers can be exercised without real hardware.
//!
//! # Features
//!
//! - **Register auto-ack**: register requests are answered like a receiver
//!   would, with per-register error or silence injection
//! - **Report injection**: feed inbound frames as if they came off the wire
//! - **Deterministic scheduling**: [`QueuedRunner`] holds background tasks
//!   until the test runs them

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rxmon_types::{RECEIVER_INDEX, Report, sub_id};

use crate::error::{Error, Result};
use crate::handlers::{EventHandler, EventHandlers, HandlerLock};
use crate::raw::{DeviceMonitor, RawDevice};
use crate::task::{Task, TaskRunner};

/// How a [`MockRawDevice`] answers requests for one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterReply {
    /// Echo the request back as the acknowledgement.
    #[default]
    Ack,
    /// Answer with an error message carrying this code.
    Error(u8),
    /// Do not answer at all.
    Silent,
}

/// A mock raw HID device.
///
/// Inbound frames are delivered synchronously on the thread calling
/// [`MockRawDevice::inject`] (or [`RawDevice::send_report`], for register
/// acknowledgements).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rxmon_core::mock::MockRawDevice;
/// use rxmon_core::receiver::{Receiver, ReceiverKind};
///
/// let raw = Arc::new(MockRawDevice::new("/dev/hidraw0"));
/// let receiver = Receiver::new(raw.clone(), ReceiverKind::Unifying, Duration::from_secs(1));
/// receiver.enumerate().unwrap();
/// assert_eq!(raw.sent().len(), 1);
/// ```
pub struct MockRawDevice {
    path: String,
    product_id: u16,
    handlers: EventHandlers<[u8]>,
    sent: Mutex<Vec<Vec<u8>>>,
    replies: Mutex<HashMap<u8, RegisterReply>>,
    fail_sends: AtomicBool,
}

impl std::fmt::Debug for MockRawDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRawDevice")
            .field("path", &self.path)
            .field("product_id", &format_args!("0x{:04x}", self.product_id))
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl MockRawDevice {
    /// Create a mock Unifying receiver at `path`.
    pub fn new(path: &str) -> Self {
        Self::with_product_id(path, 0xC52B)
    }

    /// Create a mock receiver with a specific USB product id.
    pub fn with_product_id(path: &str, product_id: u16) -> Self {
        Self {
            path: path.to_string(),
            product_id,
            handlers: EventHandlers::new(),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Deliver an inbound frame to every matching handler.
    pub fn inject(&self, frame: &[u8]) {
        self.handlers.dispatch(frame);
    }

    /// Deliver an inbound report.
    pub fn inject_report(&self, report: &Report) {
        self.inject(report.as_bytes());
    }

    /// Frames written so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frames written so far, decoded. Undecodable frames are skipped.
    pub fn sent_reports(&self) -> Vec<Report> {
        self.sent()
            .iter()
            .filter_map(|frame| Report::from_bytes(frame).ok())
            .collect()
    }

    /// Forget the frames written so far.
    pub fn clear_sent(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Configure how requests for `register` are answered.
    pub fn set_reply(&self, register: u8, reply: RegisterReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(register, reply);
    }

    /// Make every subsequent write fail as if the device had been unplugged.
    pub fn set_send_failure(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Number of registered frame handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn reply_to(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let request = Report::from_bytes(frame).ok()?;
        if request.device_index() != RECEIVER_INDEX
            || !(sub_id::SET_REGISTER_SHORT..=sub_id::GET_REGISTER_LONG).contains(&request.sub_id())
        {
            return None;
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.address())
            .copied()
            .unwrap_or_default();

        match reply {
            RegisterReply::Ack => Some(frame.to_vec()),
            RegisterReply::Error(code) => Some(vec![
                0x10,
                RECEIVER_INDEX,
                sub_id::ERROR_MESSAGE,
                request.sub_id(),
                request.address(),
                code,
                0x00,
            ]),
            RegisterReply::Silent => None,
        }
    }
}

impl RawDevice for MockRawDevice {
    fn path(&self) -> &str {
        &self.path
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn send_report(&self, report: &[u8]) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Disconnected(self.path.clone()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.to_vec());

        if let Some(response) = self.reply_to(report) {
            self.inject(&response);
        }
        Ok(())
    }

    fn add_event_handler(&self, handler: EventHandler<[u8]>) -> HandlerLock {
        self.handlers.add(handler)
    }
}

/// A mock device monitor serving [`MockRawDevice`]s by path.
#[derive(Debug, Default)]
pub struct MockDeviceMonitor {
    devices: Mutex<HashMap<String, Arc<MockRawDevice>>>,
}

impl MockDeviceMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device available under its path.
    pub fn insert(&self, device: MockRawDevice) -> Arc<MockRawDevice> {
        let device = Arc::new(device);
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.path.clone(), Arc::clone(&device));
        device
    }
}

impl DeviceMonitor for MockDeviceMonitor {
    fn open(&self, path: &str) -> Result<Arc<dyn RawDevice>> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        match devices.get(path) {
            Some(device) => Ok(Arc::clone(device) as Arc<dyn RawDevice>),
            None => Err(Error::DeviceNotFound(path.to_string())),
        }
    }
}

/// A task runner that queues tasks until the test runs them.
#[derive(Default)]
pub struct QueuedRunner {
    queue: Mutex<VecDeque<Task>>,
}

impl QueuedRunner {
    /// Create an empty runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run queued tasks, including ones they submit, until the queue is
    /// empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl TaskRunner for QueuedRunner {
    fn spawn(&self, task: Task) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }
}

impl std::fmt::Debug for QueuedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRunner")
            .field("pending", &self.pending())
            .finish()
    }
}
