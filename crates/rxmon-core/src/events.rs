//! Receiver event system.
//!
//! This module turns [`ReceiverHandler`] callbacks into serializable
//! [`ReceiverEvent`]s on a broadcast channel, for consumers that would
//! rather receive messages than implement the trait.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use rxmon_types::{ConnectionEvent, DisconnectionEvent, DiscoveryRecord, Passkey};

use crate::error::Result;
use crate::monitor::ReceiverHandler;
use crate::receiver::Receiver;

/// Events emitted for a monitored receiver.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ReceiverEvent {
    /// A device was added.
    DeviceAdded {
        receiver: String,
        event: ConnectionEvent,
    },
    /// A device was removed.
    DeviceRemoved {
        receiver: String,
        event: DisconnectionEvent,
    },
    /// A discovered device is waiting for its passkey.
    PairReady {
        receiver: String,
        device: DiscoveryRecord,
        passkey: Passkey,
    },
}

impl ReceiverEvent {
    /// Path of the receiver the event came from.
    pub fn receiver(&self) -> &str {
        match self {
            ReceiverEvent::DeviceAdded { receiver, .. }
            | ReceiverEvent::DeviceRemoved { receiver, .. }
            | ReceiverEvent::PairReady { receiver, .. } => receiver,
        }
    }
}

/// Sender for receiver events.
pub type EventSender = broadcast::Sender<ReceiverEvent>;

/// Receiver for receiver events.
pub type EventReceiver = broadcast::Receiver<ReceiverEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: ReceiverEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

/// A [`ReceiverHandler`] publishing every callback as a [`ReceiverEvent`].
///
/// Adding and removing devices always succeeds.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHandler {
    dispatcher: EventDispatcher,
}

impl BroadcastHandler {
    /// Publish through `dispatcher`.
    pub fn new(dispatcher: EventDispatcher) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher events are published on.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

impl ReceiverHandler for BroadcastHandler {
    fn add_device(&self, receiver: &Arc<Receiver>, event: ConnectionEvent) -> Result<()> {
        trace!("Publishing addition of device {}", event.index);
        self.dispatcher.send(ReceiverEvent::DeviceAdded {
            receiver: receiver.path().to_string(),
            event,
        });
        Ok(())
    }

    fn remove_device(&self, receiver: &Arc<Receiver>, event: DisconnectionEvent) -> Result<()> {
        trace!("Publishing removal of device {}", event.index);
        self.dispatcher.send(ReceiverEvent::DeviceRemoved {
            receiver: receiver.path().to_string(),
            event,
        });
        Ok(())
    }

    fn pair_ready(&self, receiver: &Arc<Receiver>, record: &DiscoveryRecord, passkey: Passkey) {
        self.dispatcher.send(ReceiverEvent::PairReady {
            receiver: receiver.path().to_string(),
            device: record.clone(),
            passkey,
        });
    }
}
