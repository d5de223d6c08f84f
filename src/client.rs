//! Host-side [`BridgeClient`].
//!
//! Combines a transport, the event dispatcher and the command handler into
//! one interface for driving a radio adapter from a PC.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::bridge::{Announcement, BridgeMessage};
use crate::commands::{ANNOUNCE_TIMEOUT, CommandHandler, MAX_CHANNEL};
use crate::error::{Error, Result};
use crate::event::{BridgeEvent, EventDispatcher, EventFilter, Subscription};
use crate::transport::{SerialConfig, SerialTransport, Transport, run_read_loop};

/// Connection state shared with the processing task.
#[derive(Debug, Default)]
struct Session {
    adapter: Option<Announcement>,
    ready: bool,
}

/// Client for a radio adapter attached to this host.
pub struct BridgeClient<T> {
    transport: Arc<Mutex<T>>,
    dispatcher: EventDispatcher,
    commands: CommandHandler<T>,
    session: Arc<RwLock<Session>>,

    read_task: Option<JoinHandle<()>>,
    process_task: Option<JoinHandle<()>>,
}

impl BridgeClient<SerialTransport> {
    /// Creates a client for a serial port (not yet connected).
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::with_serial_config(SerialConfig::new(port))
    }

    /// Creates a client with custom serial configuration.
    #[must_use]
    pub fn with_serial_config(config: SerialConfig) -> Self {
        Self::new(SerialTransport::new(config))
    }
}

impl<T: Transport + 'static> BridgeClient<T> {
    /// Creates a client over the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let dispatcher = EventDispatcher::new(256);
        let transport = Arc::new(Mutex::new(transport));
        let commands = CommandHandler::new(Arc::clone(&transport), dispatcher.clone());

        Self {
            transport,
            dispatcher,
            commands,
            session: Arc::new(RwLock::new(Session::default())),
            read_task: None,
            process_task: None,
        }
    }

    /// Connects to the adapter and initializes its radio.
    ///
    /// This will:
    /// 1. Open the transport and start the background read loop
    /// 2. Wait for the adapter's announcement
    /// 3. Send INIT with `channel` and `address`
    /// 4. Wait for the adapter's OK
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a channel above 125, `Error::Timeout` if
    /// the adapter stays silent, or `Error::Protocol` if it reports a radio
    /// failure.
    pub async fn connect(&mut self, channel: u8, address: u8) -> Result<Announcement> {
        if channel > MAX_CHANNEL {
            return Err(Error::Config {
                reason: format!("channel {channel} is above {MAX_CHANNEL}"),
            });
        }

        let format = {
            let mut transport = self.transport.lock().await;
            transport.connect().await?;
            transport.format()
        };
        if self.read_task.is_none() {
            self.start_read_loop().await?;
        }

        tracing::info!("waiting for adapter announcement");
        let announcement = self.commands.wait_announcement(ANNOUNCE_TIMEOUT).await?;
        tracing::info!(
            "adapter {} reports firmware version {}",
            announcement.uuid,
            announcement.firmware_version
        );

        let text = self
            .commands
            .init_radio(channel, address, Some(format), None)
            .await?;
        tracing::info!("{}", text);

        {
            let mut session = self.session.write().await;
            session.adapter = Some(announcement);
            session.ready = true;
        }
        self.dispatcher.dispatch(BridgeEvent::Connected);

        Ok(announcement)
    }

    /// Starts the background read and processing tasks.
    async fn start_read_loop(&mut self) -> Result<()> {
        let (message_tx, mut message_rx) = mpsc::channel::<BridgeMessage>(256);

        let reader = {
            let mut transport = self.transport.lock().await;
            transport.take_reader().ok_or(Error::NotConnected)?
        };

        self.read_task = Some(tokio::spawn(async move {
            if let Err(e) = run_read_loop(reader, message_tx).await {
                tracing::error!("read loop error: {}", e);
            }
        }));

        let dispatcher = self.dispatcher.clone();
        let session = Arc::clone(&self.session);
        self.process_task = Some(tokio::spawn(async move {
            while let Some(message) = message_rx.recv().await {
                process_message(message, &dispatcher, &session).await;
            }
        }));

        Ok(())
    }

    /// Disconnects from the adapter.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.process_task.take() {
            task.abort();
        }

        {
            let mut transport = self.transport.lock().await;
            transport.disconnect().await?;
        }
        *self.session.write().await = Session::default();

        self.dispatcher.dispatch(BridgeEvent::Disconnected);
        Ok(())
    }

    /// Returns true while the adapter's radio is initialized.
    pub async fn is_connected(&self) -> bool {
        self.session.read().await.ready
    }

    /// Returns the last announcement of the connected adapter.
    pub async fn adapter(&self) -> Option<Announcement> {
        self.session.read().await.adapter
    }

    /// Returns the command handler for direct command access.
    #[must_use]
    pub const fn commands(&self) -> &CommandHandler<T> {
        &self.commands
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe(None)
    }

    /// Subscribes to radio frames relayed by the adapter.
    #[must_use]
    pub fn subscribe_received(&self) -> Subscription {
        self.dispatcher.subscribe(Some(EventFilter::received()))
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Sends a radio frame through the adapter.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` before [`connect`](Self::connect) and
    /// `Error::SendFailed` if an acknowledged send was not delivered.
    pub async fn send_msg(&self, destination: u8, payload: &[u8], require_ack: bool) -> Result<()> {
        self.ensure_ready().await?;
        self.commands.send_msg(destination, payload, require_ack).await
    }

    /// Turns the adapter's activity blinking on or off.
    pub async fn set_blink(&self, blink: bool) -> Result<()> {
        self.ensure_ready().await?;
        self.commands.set_blink(blink).await
    }

    /// Restarts the adapter. A new [`connect`](Self::connect) is needed
    /// afterwards.
    pub async fn reboot(&self) -> Result<()> {
        self.commands.reboot().await?;
        self.session.write().await.ready = false;
        Ok(())
    }
}

/// Turns one adapter message into an event and tracks adapter restarts.
async fn process_message(
    message: BridgeMessage,
    dispatcher: &EventDispatcher,
    session: &RwLock<Session>,
) {
    let event = BridgeEvent::from_message(message);
    match &event {
        BridgeEvent::Announced(announcement) => {
            let mut session = session.write().await;
            if session.ready {
                tracing::warn!("adapter {} appears to have reset", announcement.uuid);
                session.ready = false;
            }
        }
        BridgeEvent::Error(text) => tracing::error!("adapter reported error: {}", text),
        BridgeEvent::Info(text) => tracing::info!("adapter: {}", text),
        BridgeEvent::Received(frame) => tracing::debug!("received {} radio bytes", frame.len()),
        _ => {}
    }
    dispatcher.dispatch(event);
}

impl<T> Drop for BridgeClient<T> {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.process_task.take() {
            task.abort();
        }
    }
}
