//! Raw transport abstractions.
//!
//! The byte-level link to a physical receiver (hidraw node, USB interface,
//! ...) lives outside this crate. It is consumed through [`RawDevice`],
//! and receivers are located by path through a [`DeviceMonitor`].

use std::sync::Arc;

use crate::error::Result;
use crate::handlers::{EventHandler, HandlerLock};

/// A raw HID device delivering and accepting report frames.
///
/// Implementations deliver inbound frames by dispatching them to the
/// registered handlers on their own I/O thread. Handlers must therefore
/// not block on further I/O with the same device.
pub trait RawDevice: Send + Sync {
    /// Host path of the device node.
    fn path(&self) -> &str;

    /// USB product id.
    fn product_id(&self) -> u16;

    /// Write one report frame.
    fn send_report(&self, report: &[u8]) -> Result<()>;

    /// Register a handler for inbound frames.
    fn add_event_handler(&self, handler: EventHandler<[u8]>) -> HandlerLock;
}

/// Locates and opens raw devices on the host.
pub trait DeviceMonitor: Send + Sync {
    /// Open the device at `path`.
    fn open(&self, path: &str) -> Result<Arc<dyn RawDevice>>;
}
