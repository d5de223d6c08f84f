//! Interrupt-to-loop event channel.
//!
//! The radio interrupt handler only reports what happened; the main loop
//! reads the events and does the actual work. Events cross the boundary
//! through a bounded single-producer single-consumer channel.

use tokio::sync::mpsc;

/// Default capacity of the event channel.
pub const DEFAULT_CAPACITY: usize = 8;

/// What the radio reported in an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioEvent {
    /// A payload is waiting in the receive FIFO.
    DataReady,
    /// The last transmission was acknowledged.
    SendOk,
    /// The last transmission failed.
    SendFailed,
}

/// Interrupt-side handle. Never blocks.
#[derive(Debug, Clone)]
pub struct IrqHandle {
    tx: mpsc::Sender<RadioEvent>,
}

impl IrqHandle {
    /// Reports an event to the loop.
    ///
    /// Returns false if the channel is full or the loop is gone; the event is
    /// dropped in that case.
    pub fn notify(&self, event: RadioEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("radio event channel full, dropping {:?}", event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Loop-side receiver of interrupt events.
#[derive(Debug)]
pub struct IrqEvents {
    rx: mpsc::Receiver<RadioEvent>,
}

impl IrqEvents {
    /// Waits for the next event, `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<RadioEvent> {
        self.rx.recv().await
    }

    /// Takes the next event without waiting.
    pub fn try_recv(&mut self) -> Option<RadioEvent> {
        self.rx.try_recv().ok()
    }
}

/// Creates a connected handle/receiver pair.
#[must_use]
pub fn channel(capacity: usize) -> (IrqHandle, IrqEvents) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IrqHandle { tx }, IrqEvents { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (handle, mut events) = channel(DEFAULT_CAPACITY);
        assert!(handle.notify(RadioEvent::DataReady));
        assert!(handle.notify(RadioEvent::SendOk));
        assert_eq!(events.recv().await, Some(RadioEvent::DataReady));
        assert_eq!(events.try_recv(), Some(RadioEvent::SendOk));
        assert_eq!(events.try_recv(), None);
    }

    #[test]
    fn test_notify_never_blocks_when_full() {
        let (handle, _events) = channel(1);
        assert!(handle.notify(RadioEvent::SendFailed));
        assert!(!handle.notify(RadioEvent::SendOk));
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (handle, mut events) = channel(1);
        drop(handle);
        assert_eq!(events.recv().await, None);
    }
}
