//! Event system for async message handling.
//!
//! Messages from the adapter are turned into [`BridgeEvent`]s and broadcast to
//! every subscriber. Command handlers wait on the same stream for their
//! responses.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::bridge::{Announcement, BridgeMessage, BridgeOpcode};

/// Event types that can be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The adapter's radio was initialized.
    Connected,
    /// The client disconnected.
    Disconnected,
    /// The adapter announced itself (power-up or restart).
    Announced(Announcement),
    /// Command succeeded, with optional text.
    Ok(String),
    /// Command failed or the adapter reported a fault.
    Error(String),
    /// Informational text from the adapter.
    Info(String),
    /// A radio frame received by the adapter.
    Received(Bytes),
    /// Acknowledgement payload returned by a radio peer.
    Payload(Bytes),
    /// The adapter acknowledged a reboot request.
    Rebooting,
    /// A message that does not map to another event.
    Raw(BridgeMessage),
}

impl BridgeEvent {
    /// Converts an adapter message into an event.
    #[must_use]
    pub fn from_message(message: BridgeMessage) -> Self {
        match message.opcode {
            BridgeOpcode::Msg => Self::Received(message.data),
            BridgeOpcode::Payload => Self::Payload(message.data),
            BridgeOpcode::Init => match Announcement::from_message(&message) {
                Ok(announcement) => Self::Announced(announcement),
                Err(e) => {
                    tracing::warn!("malformed announcement: {}", e);
                    Self::Raw(message)
                }
            },
            BridgeOpcode::Ok => Self::Ok(message.data_text()),
            BridgeOpcode::Error => Self::Error(message.data_text()),
            BridgeOpcode::Info => Self::Info(message.data_text()),
            BridgeOpcode::Reboot => Self::Rebooting,
            BridgeOpcode::Setting => Self::Raw(message),
        }
    }

    /// Returns the bridge opcode the event came from, if any.
    #[must_use]
    pub const fn opcode(&self) -> Option<BridgeOpcode> {
        match self {
            Self::Announced(_) => Some(BridgeOpcode::Init),
            Self::Ok(_) => Some(BridgeOpcode::Ok),
            Self::Error(_) => Some(BridgeOpcode::Error),
            Self::Info(_) => Some(BridgeOpcode::Info),
            Self::Received(_) => Some(BridgeOpcode::Msg),
            Self::Payload(_) => Some(BridgeOpcode::Payload),
            Self::Rebooting => Some(BridgeOpcode::Reboot),
            Self::Raw(message) => Some(message.opcode),
            Self::Connected | Self::Disconnected => None,
        }
    }
}

/// Subscription filter for specific event types.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by opcodes.
    pub opcodes: Option<Vec<BridgeOpcode>>,
}

impl EventFilter {
    /// Creates a filter for specific opcodes.
    #[must_use]
    pub const fn opcodes(opcodes: Vec<BridgeOpcode>) -> Self {
        Self {
            opcodes: Some(opcodes),
        }
    }

    /// Creates a filter for relayed radio frames.
    #[must_use]
    pub fn received() -> Self {
        Self::opcodes(vec![BridgeOpcode::Msg])
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &BridgeEvent) -> bool {
        match (&self.opcodes, event.opcode()) {
            (None, _) => true,
            (Some(opcodes), Some(opcode)) => opcodes.contains(&opcode),
            (Some(_), None) => false,
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<BridgeEvent>,
    filter: EventFilter,
}

impl Subscription {
    /// Receives the next matching event.
    ///
    /// Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("subscriber lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: Arc<broadcast::Sender<BridgeEvent>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: BridgeEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to events with an optional filter.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: filter.unwrap_or_default(),
        }
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the channel is closed.
    pub async fn wait_for(&self, filter: EventFilter, timeout: Duration) -> Option<BridgeEvent> {
        let mut subscription = self.subscribe(Some(filter));
        tokio::time::timeout(timeout, subscription.recv())
            .await
            .ok()
            .flatten()
    }
}
