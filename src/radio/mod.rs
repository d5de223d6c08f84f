//! Radio transceiver abstraction.
//!
//! [`Radio`] is the driver seam (an nRF24-class transceiver with hardware
//! acknowledgements). [`RadioLink`] wraps a driver with one of the two I/O
//! strategies and adds bounded send retries.

pub mod irq;
pub mod mock;

use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::frame::MAX_FRAME_SIZE;

pub use irq::{IrqEvents, IrqHandle, RadioEvent};
pub use mock::{MockRadio, SentFrame};

/// Default delay between two send attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Transceiver driver.
pub trait Radio: Send {
    /// Powers up the transceiver with a local address on a channel.
    ///
    /// Returns false if the chip does not respond.
    fn init(&mut self, address: u8, channel: u8) -> bool;

    /// Transmits `data` and blocks until the transmission completes.
    ///
    /// With `require_ack` the result reflects the hardware acknowledgement.
    fn send(&mut self, destination: u8, data: &[u8], require_ack: bool) -> bool;

    /// Length of the payload waiting in the receive FIFO, 0 if none.
    fn has_data(&mut self) -> usize;

    /// Copies the waiting payload into `buf` and returns its length.
    fn read_into(&mut self, buf: &mut [u8]) -> usize;

    /// Starts a transmission whose outcome is reported through an interrupt.
    ///
    /// Drivers without interrupt support keep the default, which refuses.
    fn start_send(&mut self, destination: u8, data: &[u8], require_ack: bool) -> bool {
        let _ = (destination, data, require_ack);
        false
    }

    /// Returns to receive mode after an interrupt-driven transmission.
    fn start_rx(&mut self) {}
}

/// How the loop learns about radio activity.
///
/// The two strategies are mutually exclusive for one link.
#[derive(Debug)]
pub enum IoMode {
    /// Ask the driver for waiting data on every poll.
    Polling,
    /// Consume events reported by the interrupt handler.
    Interrupt(IrqEvents),
}

/// A radio driver with an I/O strategy and send retries.
pub struct RadioLink<R> {
    radio: R,
    mode: IoMode,
    retries: u8,
    retry_delay: Duration,
    pending_rx: usize,
}

impl<R: Radio> RadioLink<R> {
    /// Creates a link with one send attempt per frame.
    #[must_use]
    pub const fn new(radio: R, mode: IoMode) -> Self {
        Self {
            radio,
            mode,
            retries: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
            pending_rx: 0,
        }
    }

    /// Sets the number of send attempts (at least 1) and the delay between them.
    #[must_use]
    pub fn with_retries(mut self, retries: u8, delay: Duration) -> Self {
        self.retries = retries.max(1);
        self.retry_delay = delay;
        self
    }

    /// Returns the driver.
    #[must_use]
    pub const fn radio(&self) -> &R {
        &self.radio
    }

    /// Returns the driver mutably.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Returns true if the link runs in interrupt mode.
    #[must_use]
    pub const fn is_interrupt_driven(&self) -> bool {
        matches!(self.mode, IoMode::Interrupt(_))
    }

    /// Initializes the transceiver.
    ///
    /// # Errors
    ///
    /// Returns `Error::RadioInit` if the chip does not respond.
    pub fn init(&mut self, address: u8, channel: u8) -> Result<()> {
        tracing::info!("initializing radio: address {address}, channel {channel}");
        if self.radio.init(address, channel) {
            self.pending_rx = 0;
            Ok(())
        } else {
            Err(Error::RadioInit { address, channel })
        }
    }

    /// Performs a single transmission.
    pub async fn send_once(&mut self, destination: u8, data: &[u8], require_ack: bool) -> bool {
        let IoMode::Interrupt(events) = &mut self.mode else {
            return self.radio.send(destination, data, require_ack);
        };

        if !self.radio.start_send(destination, data, require_ack) {
            tracing::warn!("radio refused to start transmission");
            return false;
        }

        let ok = loop {
            match events.recv().await {
                Some(RadioEvent::SendOk) => break true,
                Some(RadioEvent::SendFailed) => break false,
                Some(RadioEvent::DataReady) => self.pending_rx += 1,
                None => {
                    tracing::error!("radio event channel closed during send");
                    break false;
                }
            }
        };
        self.radio.start_rx();
        ok
    }

    /// Sends `data` with hardware acknowledgement, retrying on failure.
    ///
    /// # Errors
    ///
    /// Returns `Error::SendFailed` once every attempt went unacknowledged.
    pub async fn send_with_retry(&mut self, destination: u8, data: &[u8]) -> Result<()> {
        for attempt in 1..=self.retries {
            if self.send_once(destination, data, true).await {
                tracing::trace!("sent {} bytes to {destination} on attempt {attempt}", data.len());
                return Ok(());
            }
            tracing::debug!(
                "send to {destination} failed (attempt {attempt}/{})",
                self.retries
            );
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(Error::SendFailed {
            destination,
            attempts: self.retries,
        })
    }

    /// Returns the next received payload, if any.
    pub fn poll_receive(&mut self) -> Option<Bytes> {
        if let IoMode::Interrupt(events) = &mut self.mode {
            while let Some(event) = events.try_recv() {
                if event == RadioEvent::DataReady {
                    self.pending_rx += 1;
                }
            }
            if self.pending_rx == 0 {
                return None;
            }
            self.pending_rx -= 1;
        }

        let len = self.radio.has_data();
        if len == 0 {
            return None;
        }

        let mut buf = [0u8; MAX_FRAME_SIZE];
        let n = self.radio.read_into(&mut buf).min(MAX_FRAME_SIZE);
        tracing::trace!("received {n} bytes");
        Some(Bytes::copy_from_slice(&buf[..n]))
    }
}

impl<R> std::fmt::Debug for RadioLink<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioLink")
            .field("mode", &self.mode)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}
