//! Transport over an already-open async stream.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::bridge::{BridgeMessage, WireFormat, encode};
use crate::error::{Error, Result};
use crate::transport::{BoxedReader, Transport};

/// Transport over any `AsyncRead + AsyncWrite` stream, such as a TCP
/// connection to a networked adapter or one end of `tokio::io::duplex`.
///
/// The stream is open from construction; `connect` only marks the transport
/// usable again after `disconnect`, which drops the write half.
pub struct StreamTransport<S> {
    writer: Option<Arc<Mutex<WriteHalf<S>>>>,
    reader: Option<ReadHalf<S>>,
    format: WireFormat,
    connected: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps a stream using binary encoding.
    #[must_use]
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            writer: Some(Arc::new(Mutex::new(writer))),
            reader: Some(reader),
            format: WireFormat::Binary,
            connected: false,
        }
    }

    /// Sets the encoding of outgoing messages.
    #[must_use]
    pub const fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Sync + 'static,
{
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.writer.is_none() {
                return Err(Error::NotConnected);
            }
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(writer) = self.writer.take() {
                let mut writer = writer.lock().await;
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("stream shutdown failed: {}", e);
                }
            }
            self.reader = None;
            self.connected = false;
            Ok(())
        })
    }

    fn send(&mut self, message: BridgeMessage) -> BoxFuture<'_, Result<()>> {
        let writer = if self.connected {
            self.writer.clone()
        } else {
            None
        };
        let format = self.format;
        Box::pin(async move {
            let writer = writer.ok_or(Error::NotConnected)?;
            let wire = encode(&message, format);
            tracing::trace!("sending {}: {} bytes", message.opcode, wire.len());

            let mut writer = writer.lock().await;
            writer.write_all(&wire).await?;
            writer.flush().await?;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn take_reader(&mut self) -> Option<BoxedReader> {
        self.reader
            .take()
            .map(|reader| Box::new(reader) as BoxedReader)
    }

    fn format(&self) -> WireFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::bridge::{BridgeDecoder, BridgeOpcode};

    fn boxed_transport<T: Transport + 'static>(transport: T) -> Box<dyn Transport> {
        Box::new(transport)
    }

    #[tokio::test]
    async fn test_usable_as_shared_transport() {
        let (near, _far) = tokio::io::duplex(64);
        let mut transport = boxed_transport(StreamTransport::new(near));
        let handle = tokio::spawn(async move {
            transport.connect().await.unwrap();
            transport.is_connected()
        });
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_send_encodes_in_configured_format() {
        let (near, mut far) = tokio::io::duplex(256);
        let mut transport = StreamTransport::new(near).with_format(WireFormat::ClearText);

        let msg = BridgeMessage::new(BridgeOpcode::Setting, vec![1]);
        assert!(matches!(
            transport.send(msg.clone()).await,
            Err(Error::NotConnected)
        ));

        transport.connect().await.unwrap();
        transport.send(msg.clone()).await.unwrap();

        let mut buf = [0u8; 32];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b";SETTING:1;\n");

        let mut decoder = BridgeDecoder::new();
        decoder.feed(&buf[..n]);
        assert_eq!(decoder.decode().unwrap(), Some(msg));
    }

    #[tokio::test]
    async fn test_disconnect_closes_stream() {
        let (near, mut far) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(near);
        transport.connect().await.unwrap();
        assert!(transport.take_reader().is_some());
        assert!(transport.take_reader().is_none());

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        let mut buf = [0u8; 8];
        assert_eq!(far.read(&mut buf).await.unwrap(), 0);
        assert!(transport.connect().await.is_err());
    }
}
