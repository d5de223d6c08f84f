//! Command handlers for adapter operations.
//!
//! Each command writes one host request and, where the adapter answers,
//! waits for the matching response on the event stream.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::bridge::{Announcement, BridgeOpcode, HostRequest, WireFormat};
use crate::error::{Error, FrameError, Result};
use crate::event::{BridgeEvent, EventDispatcher, EventFilter};
use crate::protocol::MAX_FRAME_SIZE;
use crate::transport::Transport;

/// Highest radio channel the adapter accepts.
pub const MAX_CHANNEL: u8 = 125;

/// Wait for the adapter's announcement; it repeats every 5 s.
pub const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(6);

/// Wait for the answer to a radio init request.
pub const INIT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Wait for the answer to a relayed frame.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Wait for the reboot acknowledgement.
pub const REBOOT_TIMEOUT: Duration = Duration::from_secs(1);

fn timeout_error(timeout: Duration) -> Error {
    Error::Timeout {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Command handler for adapter operations.
///
/// The adapter's OK and ERROR carry no request id, so requests that expect
/// one are issued one at a time.
pub struct CommandHandler<T> {
    transport: Arc<Mutex<T>>,
    dispatcher: EventDispatcher,
    send_timeout: Duration,
    in_flight: Mutex<()>,
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(transport: Arc<Mutex<T>>, dispatcher: EventDispatcher) -> Self {
        Self {
            transport,
            dispatcher,
            send_timeout: SEND_TIMEOUT,
            in_flight: Mutex::new(()),
        }
    }

    /// Sets how long [`send_msg`](Self::send_msg) waits for the adapter.
    pub fn set_send_timeout(&mut self, timeout: Duration) {
        self.send_timeout = timeout;
    }

    /// Sends a request and waits for one of the expected opcodes.
    async fn send_and_wait(
        &self,
        request: &HostRequest,
        expected: &[BridgeOpcode],
        timeout: Duration,
    ) -> Result<BridgeEvent> {
        let _in_flight = self.in_flight.lock().await;
        // Subscribe before sending; a fast answer is otherwise lost.
        let mut subscription = self
            .dispatcher
            .subscribe(Some(EventFilter::opcodes(expected.to_vec())));

        self.send(request).await?;

        match tokio::time::timeout(timeout, subscription.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(Error::ChannelClosed),
            Err(_) => Err(timeout_error(timeout)),
        }
    }

    async fn send(&self, request: &HostRequest) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.send(request.to_message()).await
    }

    /// Waits for the adapter to announce itself.
    pub async fn wait_announcement(&self, timeout: Duration) -> Result<Announcement> {
        let filter = EventFilter::opcodes(vec![BridgeOpcode::Init]);
        match self.dispatcher.wait_for(filter, timeout).await {
            Some(BridgeEvent::Announced(announcement)) => Ok(announcement),
            Some(other) => Err(Error::Protocol {
                message: format!("unexpected announcement {other:?}"),
            }),
            None => Err(timeout_error(timeout)),
        }
    }

    /// Asks the adapter to initialize its radio.
    ///
    /// `format` selects the encoding the adapter answers with. Returns the
    /// adapter's confirmation text.
    pub async fn init_radio(
        &self,
        channel: u8,
        address: u8,
        format: Option<WireFormat>,
        blink: Option<bool>,
    ) -> Result<String> {
        if channel > MAX_CHANNEL {
            return Err(Error::Config {
                reason: format!("channel {channel} is above {MAX_CHANNEL}"),
            });
        }
        let request = HostRequest::Init {
            channel,
            address,
            format,
            blink,
        };
        let event = self
            .send_and_wait(&request, &[BridgeOpcode::Ok, BridgeOpcode::Error], INIT_TIMEOUT)
            .await?;
        match event {
            BridgeEvent::Ok(text) => Ok(text),
            BridgeEvent::Error(message) => Err(Error::Protocol { message }),
            other => Err(Error::Protocol {
                message: format!("unexpected response to INIT: {other:?}"),
            }),
        }
    }

    /// Relays a frame over the adapter's radio.
    ///
    /// The adapter answers every frame with OK or ERROR and the call waits
    /// for that answer. With `require_ack` an ERROR fails with
    /// `Error::SendFailed`; without it the outcome is only logged.
    pub async fn send_msg(&self, destination: u8, payload: &[u8], require_ack: bool) -> Result<()> {
        if payload.is_empty() {
            return Err(FrameError::TooShort { need: 1, got: 0 }.into());
        }
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            }
            .into());
        }
        let request = HostRequest::Msg {
            destination,
            require_ack,
            payload: Bytes::copy_from_slice(payload),
        };
        let event = self
            .send_and_wait(
                &request,
                &[BridgeOpcode::Ok, BridgeOpcode::Error],
                self.send_timeout,
            )
            .await?;
        match event {
            BridgeEvent::Ok(_) => Ok(()),
            BridgeEvent::Error(text) if !require_ack => {
                tracing::debug!("unacknowledged send to {destination} reported {text:?}");
                Ok(())
            }
            BridgeEvent::Error(text) => {
                tracing::debug!("adapter reported send failure to {destination}: {text:?}");
                Err(Error::SendFailed {
                    destination,
                    attempts: 1,
                })
            }
            other => Err(Error::Protocol {
                message: format!("unexpected response to MSG: {other:?}"),
            }),
        }
    }

    /// Turns the adapter's activity blinking on or off.
    ///
    /// The adapter does not answer this request.
    pub async fn set_blink(&self, blink: bool) -> Result<()> {
        self.send(&HostRequest::Setting { blink }).await
    }

    /// Asks the adapter to restart and waits for the acknowledgement.
    pub async fn reboot(&self) -> Result<()> {
        self.send_and_wait(&HostRequest::Reboot, &[BridgeOpcode::Reboot], REBOOT_TIMEOUT)
            .await
            .map(|_| ())
    }
}
