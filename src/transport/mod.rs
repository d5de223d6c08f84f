//! Host-side transports to a radio adapter.
//!
//! A transport moves [`BridgeMessage`]s over a byte stream. Two are provided:
//! [`SerialTransport`] for adapters on a serial port and [`StreamTransport`]
//! for any async stream (TCP bridges, in-memory pipes).

pub mod serial;
pub mod stream;

use std::io;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::bridge::{BridgeDecoder, BridgeMessage, WireFormat};
use crate::error::{Error, Result};

/// Read half handed to the background read loop.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Opens the connection.
    fn connect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Closes the connection.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Encodes and writes one message.
    fn send(&mut self, message: BridgeMessage) -> BoxFuture<'_, Result<()>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Takes the read half for the background read loop.
    ///
    /// Returns `None` before connecting or if already taken.
    fn take_reader(&mut self) -> Option<BoxedReader>;

    /// Encoding used for outgoing messages.
    fn format(&self) -> WireFormat;
}

/// Reads and decodes messages until the stream closes or the receiver is
/// dropped.
///
/// # Errors
///
/// Returns an error if reading fails or the stream closes.
pub async fn run_read_loop(
    mut reader: BoxedReader,
    tx: mpsc::Sender<BridgeMessage>,
) -> Result<()> {
    let mut decoder = BridgeDecoder::new();
    let mut buf = [0u8; 256];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("adapter stream closed");
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "adapter stream closed",
                )));
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("read error: {}", e);
                return Err(Error::Io(e));
            }
        };

        tracing::trace!("received {} bytes", n);
        decoder.feed(&buf[..n]);

        loop {
            match decoder.decode() {
                Ok(Some(message)) => {
                    tracing::trace!("decoded {} ({} bytes)", message.opcode, message.data.len());
                    if tx.send(message).await.is_err() {
                        tracing::debug!("message receiver dropped");
                        return Ok(());
                    }
                }
                Ok(None) => break,
                // The decoder has already resynchronised
                Err(e) => tracing::warn!("message decode error: {}", e),
            }
        }
    }
}

pub use serial::{SerialConfig, SerialTransport, list_ports};
pub use stream::StreamTransport;
