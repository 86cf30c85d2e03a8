//! Device lifecycle and pairing monitor for HID++ wireless receivers.
//!
//! This crate watches the report stream of a Logitech Unifying or Bolt
//! receiver and turns it into device-level events: a device attached, a
//! device detached, a device waiting for its pairing passkey.
//!
//! # Features
//!
//! - **Subscriptions**: predicate/callback handlers over the raw and decoded
//!   report streams, released through drop-safe locks
//! - **Deadlock-free dispatch**: lifecycle callbacks run on background
//!   tasks, never on the I/O thread that delivered the report
//! - **Pairing**: legacy lock-based pairing and Bolt discovery + passkey
//!   pairing through one state machine
//! - **Recovery**: pick up devices that linked before monitoring started
//! - **Testing**: mock transport and a deterministic task runner
//!
//! # Supported Receivers
//!
//! | Receiver | Pairing flow |
//! |----------|--------------|
//! | Unifying / Nano (HID++ 1.0) | Open the pairing lock, wait for a device |
//! | Bolt (`0xC548`) | Discover, request a passkey, pair |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rxmon_core::{
//!     DeviceMonitor, EventDispatcher, BroadcastHandler, MonitorOptions, ReceiverMonitor,
//!     TokioRunner,
//! };
//!
//! # fn transport() -> Box<dyn DeviceMonitor> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = transport();
//!     let dispatcher = EventDispatcher::default();
//!     let mut events = dispatcher.subscribe();
//!
//!     let monitor = ReceiverMonitor::new(
//!         "/dev/hidraw0",
//!         devices.as_ref(),
//!         MonitorOptions::from_secs_f64(2.0)?,
//!         Arc::new(BroadcastHandler::new(dispatcher)),
//!         Arc::new(TokioRunner::current()?),
//!     )?;
//!     monitor.ready()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod events;
pub mod handlers;
pub mod mock;
pub mod monitor;
pub mod pairing;
pub mod raw;
pub mod receiver;
pub mod task;

// Core exports
pub use error::{Error, Result};
pub use handlers::{EventHandler, EventHandlers, HandlerLock};
pub use monitor::{MonitorOptions, ReceiverHandler, ReceiverMonitor, SubscriptionKind};
pub use pairing::{PairState, PairingMachine};
pub use raw::{DeviceMonitor, RawDevice};
pub use receiver::{Receiver, ReceiverKind};
pub use task::{Task, TaskRunner, TokioRunner};

pub use events::{BroadcastHandler, EventDispatcher, EventReceiver, EventSender, ReceiverEvent};
pub use mock::{MockDeviceMonitor, MockRawDevice, QueuedRunner, RegisterReply};

// Re-export from rxmon-types
pub use rxmon_types::{
    ConnectionEvent, DeviceIndex, DisconnectionEvent, DiscoveryRecord, NotificationFlags,
    Passkey, Report, ReportType,
};
