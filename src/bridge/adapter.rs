//! Radio adapter runtime.
//!
//! Lifecycle:
//! 1. Announce firmware version and UUID every few seconds until the host
//!    sends INIT with a channel and address.
//! 2. Initialize the radio. On failure report ERROR until the host asks
//!    for a reboot.
//! 3. Relay: radio frames go to the host as MSG, host MSG requests go to the
//!    radio and are answered with OK or ERROR.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};

use crate::bridge::WireFormat;
use crate::bridge::codec::{self, BridgeDecoder};
use crate::bridge::message::{Announcement, BridgeMessage, HostRequest};
use crate::bridge::opcode::BridgeOpcode;
use crate::error::Result;
use crate::protocol::MAX_FRAME_SIZE;
use crate::radio::{Radio, RadioLink};
use crate::types::Uuid;

/// Default period of the power-up announcement.
pub const DEFAULT_ANNOUNCE_PERIOD: Duration = Duration::from_secs(5);

/// Default wait for host data during the announcement phase.
pub const DEFAULT_HOST_POLL: Duration = Duration::from_millis(100);

/// Default period of ERROR reports after a failed radio init.
pub const DEFAULT_ERROR_PERIOD: Duration = Duration::from_secs(1);

/// Default radio poll interval in the relay phase.
pub const DEFAULT_RADIO_POLL: Duration = Duration::from_millis(10);

/// Visual feedback hooks (LEDs on real adapters).
pub trait Indicator: Send {
    /// Radio traffic was relayed; only called while blinking is enabled.
    fn activity(&mut self) {}

    /// The radio initialization finished.
    fn radio_init(&mut self, ok: bool) {
        let _ = ok;
    }
}

/// An indicator that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {}

/// Adapter settings.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Firmware version announced to the host.
    pub firmware_version: u8,
    /// Adapter UUID announced to the host.
    pub uuid: Uuid,
    /// Encoding used until the host selects one.
    pub format: WireFormat,
    /// Blink on activity until the host changes it.
    pub blink: bool,
    /// Announcement period.
    pub announce_period: Duration,
    /// Wait for host data between announcements.
    pub host_poll: Duration,
    /// Period of ERROR reports after a failed radio init.
    pub error_period: Duration,
    /// Radio poll interval while relaying.
    pub radio_poll: Duration,
}

impl AdapterConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new(uuid: Uuid, firmware_version: u8) -> Self {
        Self {
            firmware_version,
            uuid,
            format: WireFormat::Binary,
            blink: true,
            announce_period: DEFAULT_ANNOUNCE_PERIOD,
            host_poll: DEFAULT_HOST_POLL,
            error_period: DEFAULT_ERROR_PERIOD,
            radio_poll: DEFAULT_RADIO_POLL,
        }
    }

    /// Sets the initial wire format.
    #[must_use]
    pub const fn format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the initial blink flag.
    #[must_use]
    pub const fn blink(mut self, blink: bool) -> Self {
        self.blink = blink;
        self
    }

    /// Sets the announcement period.
    #[must_use]
    pub const fn announce_period(mut self, period: Duration) -> Self {
        self.announce_period = period;
        self
    }

    /// Sets the radio poll interval.
    #[must_use]
    pub const fn radio_poll(mut self, interval: Duration) -> Self {
        self.radio_poll = interval;
        self
    }
}

/// Why the adapter stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterExit {
    /// The host requested a restart; the caller should reset the adapter.
    Reboot,
    /// The host side of the stream closed.
    HostClosed,
}

/// Bridges a radio link and a host byte stream.
pub struct Adapter<R, IO, I = NoIndicator> {
    config: AdapterConfig,
    link: RadioLink<R>,
    io: IO,
    indicator: I,
    decoder: BridgeDecoder,
    format: WireFormat,
    blink: bool,
}

impl<R, IO> Adapter<R, IO, NoIndicator>
where
    R: Radio,
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates an adapter without an indicator.
    #[must_use]
    pub fn new(config: AdapterConfig, link: RadioLink<R>, io: IO) -> Self {
        let format = config.format;
        let blink = config.blink;
        Self {
            config,
            link,
            io,
            indicator: NoIndicator,
            decoder: BridgeDecoder::new(),
            format,
            blink,
        }
    }
}

impl<R, IO, I> Adapter<R, IO, I>
where
    R: Radio,
    IO: AsyncRead + AsyncWrite + Unpin + Send,
    I: Indicator,
{
    /// Replaces the indicator.
    #[must_use]
    pub fn with_indicator<J: Indicator>(self, indicator: J) -> Adapter<R, IO, J> {
        Adapter {
            config: self.config,
            link: self.link,
            io: self.io,
            indicator,
            decoder: self.decoder,
            format: self.format,
            blink: self.blink,
        }
    }

    /// Returns the current wire format.
    #[must_use]
    pub const fn format(&self) -> WireFormat {
        self.format
    }

    /// Returns the current blink flag.
    #[must_use]
    pub const fn blink(&self) -> bool {
        self.blink
    }

    /// Returns the radio link.
    #[must_use]
    pub const fn link(&self) -> &RadioLink<R> {
        &self.link
    }

    /// Runs the adapter until the host asks for a reboot or disconnects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the host stream fails.
    pub async fn run(&mut self) -> Result<AdapterExit> {
        let (channel, address) = match self.wait_for_host().await? {
            Ok(init) => init,
            Err(exit) => return Ok(exit),
        };

        let init = self.link.init(address, channel);
        self.indicator.radio_init(init.is_ok());
        if let Err(e) = init {
            tracing::error!("{e}");
            return self.report_init_failure().await;
        }

        let text = format!("RADIO INITIALIZED channel:{channel} address:{address}");
        tracing::info!("{text}");
        self.send(&BridgeMessage::text(BridgeOpcode::Ok, &text))
            .await?;
        self.relay().await
    }

    async fn send(&mut self, message: &BridgeMessage) -> Result<()> {
        let wire = codec::encode(message, self.format);
        tracing::trace!("to host: {} ({} bytes)", message.opcode, wire.len());
        self.io.write_all(&wire).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Feeds a read result into the decoder. Returns false on end of stream.
    fn on_read(&mut self, read: io::Result<usize>, buf: &[u8]) -> Result<bool> {
        let n = read?;
        if n == 0 {
            tracing::info!("host closed the stream");
            return Ok(false);
        }
        self.decoder.feed(&buf[..n]);
        Ok(true)
    }

    fn next_message(&mut self) -> Option<BridgeMessage> {
        loop {
            match self.decoder.decode() {
                Ok(message) => return message,
                Err(e) => tracing::warn!("invalid host message: {e}"),
            }
        }
    }

    async fn acknowledge_reboot(&mut self) -> Result<AdapterExit> {
        tracing::info!("reboot requested by host");
        self.send(&BridgeMessage::empty(BridgeOpcode::Reboot)).await?;
        Ok(AdapterExit::Reboot)
    }

    /// Announces the adapter until the host sends INIT.
    async fn wait_for_host(&mut self) -> Result<std::result::Result<(u8, u8), AdapterExit>> {
        let announcement = Announcement {
            firmware_version: self.config.firmware_version,
            uuid: self.config.uuid,
        }
        .to_message();
        let mut last_announce: Option<Instant> = None;
        let mut buf = [0u8; 64];

        loop {
            if last_announce.is_none_or(|at| at.elapsed() >= self.config.announce_period) {
                tracing::debug!("announcing adapter {}", self.config.uuid);
                self.send(&announcement).await?;
                last_announce = Some(Instant::now());
            }

            if let Ok(read) = tokio::time::timeout(self.config.host_poll, self.io.read(&mut buf)).await {
                if !self.on_read(read, &buf)? {
                    return Ok(Err(AdapterExit::HostClosed));
                }
            }

            while let Some(message) = self.next_message() {
                match HostRequest::parse(&message) {
                    Ok(HostRequest::Init {
                        channel,
                        address,
                        format,
                        blink,
                    }) => {
                        if let Some(format) = format {
                            self.format = format;
                        }
                        if let Some(blink) = blink {
                            self.blink = blink;
                        }
                        tracing::info!("host init: channel {channel} address {address}");
                        return Ok(Ok((channel, address)));
                    }
                    Ok(HostRequest::Reboot) => return self.acknowledge_reboot().await.map(Err),
                    Ok(other) => tracing::debug!("ignoring {other:?} before init"),
                    Err(e) => tracing::warn!("invalid host request: {e}"),
                }
            }
        }
    }

    /// Reports the radio failure until the host asks for a reboot.
    async fn report_init_failure(&mut self) -> Result<AdapterExit> {
        let error = BridgeMessage::text(BridgeOpcode::Error, "RADIO CONNECTION ERROR!");
        let mut tick = tokio::time::interval(self.config.error_period);
        let mut buf = [0u8; 64];

        loop {
            tokio::select! {
                _ = tick.tick() => self.send(&error).await?,
                read = self.io.read(&mut buf) => {
                    if !self.on_read(read, &buf)? {
                        return Ok(AdapterExit::HostClosed);
                    }
                    while let Some(message) = self.next_message() {
                        if message.opcode == BridgeOpcode::Reboot {
                            return self.acknowledge_reboot().await;
                        }
                        tracing::debug!("radio unavailable, ignoring {}", message.opcode);
                    }
                }
            }
        }
    }

    async fn relay(&mut self) -> Result<AdapterExit> {
        let mut tick = tokio::time::interval(self.config.radio_poll);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = [0u8; 64];

        loop {
            while let Some(message) = self.next_message() {
                if let Some(exit) = self.handle_request(&message).await? {
                    return Ok(exit);
                }
            }

            tokio::select! {
                read = self.io.read(&mut buf) => {
                    if !self.on_read(read, &buf)? {
                        return Ok(AdapterExit::HostClosed);
                    }
                }
                _ = tick.tick() => {
                    while let Some(frame) = self.link.poll_receive() {
                        tracing::debug!("relaying {} radio bytes to host", frame.len());
                        self.show_activity();
                        self.send(&BridgeMessage::new(BridgeOpcode::Msg, frame)).await?;
                    }
                }
            }
        }
    }

    fn show_activity(&mut self) {
        if self.blink {
            self.indicator.activity();
        }
    }

    async fn handle_request(&mut self, message: &BridgeMessage) -> Result<Option<AdapterExit>> {
        let request = match HostRequest::parse(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("invalid host request {}: {e}", message.opcode);
                return Ok(None);
            }
        };

        match request {
            HostRequest::Msg {
                destination,
                require_ack,
                payload,
            } => {
                if payload.len() > MAX_FRAME_SIZE {
                    tracing::warn!("refusing {}-byte radio payload", payload.len());
                    self.send(&BridgeMessage::text(BridgeOpcode::Error, "PAYLOAD TOO LARGE"))
                        .await?;
                    return Ok(None);
                }
                self.show_activity();
                let delivered = self.link.send_once(destination, &payload, require_ack).await;
                tracing::debug!(
                    "relayed {} bytes to {destination}: {}",
                    payload.len(),
                    if delivered { "ok" } else { "failed" }
                );
                let reply = if delivered {
                    BridgeOpcode::Ok
                } else {
                    BridgeOpcode::Error
                };
                self.send(&BridgeMessage::empty(reply)).await?;
            }
            HostRequest::Setting { blink } => {
                tracing::debug!("blink on activity: {blink}");
                self.blink = blink;
            }
            HostRequest::Reboot => return self.acknowledge_reboot().await.map(Some),
            HostRequest::Init { .. } => {
                tracing::warn!("radio already initialized, ignoring INIT");
            }
        }
        Ok(None)
    }
}

impl<R, IO, I> std::fmt::Debug for Adapter<R, IO, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("uuid", &self.config.uuid)
            .field("format", &self.format)
            .field("blink", &self.blink)
            .finish_non_exhaustive()
    }
}
