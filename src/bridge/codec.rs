//! Wire encodings of the serial bridge.
//!
//! Binary (byte-stuffed):
//! ```text
//! ┌──────┬────────┬──────────────────────────────┬──────┐
//! │ 0xFF │ opcode │ data, 0xFF/0xFE/0xF0 escaped │ 0xFE │
//! └──────┴────────┴──────────────────────────────┴──────┘
//! ```
//! Clear text:
//! ```text
//! ;NAME:value:value;\n
//! ```
//! with values in decimal. In both encodings `0xF0` makes the following byte
//! literal on receive.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::bridge::WireFormat;
use crate::bridge::message::BridgeMessage;
use crate::bridge::opcode::BridgeOpcode;
use crate::error::FrameError;

/// Starts a binary message.
pub const START_BYTE: u8 = 0xFF;

/// Ends a binary message.
pub const END_BYTE: u8 = 0xFE;

/// Makes the next byte literal.
pub const ESCAPE_BYTE: u8 = 0xF0;

/// Starts and ends a clear-text message.
pub const MESSAGE_SEPARATOR: u8 = b';';

/// Separates clear-text fields.
pub const BYTE_SEPARATOR: u8 = b':';

/// Largest message data the decoder accepts, in decoded bytes.
pub const MAX_MESSAGE_SIZE: usize = 128;

/// Longest clear-text opcode name.
const MAX_NAME_LEN: usize = 7;

/// Raw body bytes buffered for one message before it is dropped.
const fn body_limit(framing: Framing) -> usize {
    match framing {
        Framing::Binary => 1 + MAX_MESSAGE_SIZE,
        // ":255" per data byte
        Framing::Text => MAX_NAME_LEN + 4 * MAX_MESSAGE_SIZE,
    }
}

const fn is_special(byte: u8) -> bool {
    matches!(byte, START_BYTE | END_BYTE | ESCAPE_BYTE)
}

/// Encodes a message in the given wire format.
#[must_use]
pub fn encode(message: &BridgeMessage, format: WireFormat) -> Bytes {
    match format {
        WireFormat::Binary => encode_binary(message),
        WireFormat::ClearText => encode_text(message),
    }
}

/// Encodes a byte-stuffed binary message.
#[must_use]
pub fn encode_binary(message: &BridgeMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(3 + message.data.len() * 2);
    buf.put_u8(START_BYTE);
    buf.put_u8(message.opcode.as_byte());
    for &byte in &message.data {
        if is_special(byte) {
            buf.put_u8(ESCAPE_BYTE);
        }
        buf.put_u8(byte);
    }
    buf.put_u8(END_BYTE);
    buf.freeze()
}

/// Encodes a clear-text message.
#[must_use]
pub fn encode_text(message: &BridgeMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(12 + message.data.len() * 4);
    buf.put_u8(MESSAGE_SEPARATOR);
    buf.put_slice(message.opcode.name().as_bytes());
    for byte in &message.data {
        buf.put_u8(BYTE_SEPARATOR);
        buf.put_slice(byte.to_string().as_bytes());
    }
    buf.put_u8(MESSAGE_SEPARATOR);
    buf.put_u8(b'\n');
    buf.freeze()
}

fn parse_text(body: &[u8]) -> Result<BridgeMessage, FrameError> {
    let text = std::str::from_utf8(body).map_err(|e| FrameError::InvalidText {
        reason: e.to_string(),
    })?;
    let mut fields = text.trim().split(char::from(BYTE_SEPARATOR));
    let name = fields.next().unwrap_or_default();

    let Some(opcode) = BridgeOpcode::from_name(name) else {
        tracing::debug!("unknown clear-text opcode {name:?}");
        return Ok(BridgeMessage::empty(BridgeOpcode::Error));
    };

    let mut data = BytesMut::new();
    for field in fields.filter(|f| !f.is_empty()) {
        let value = field.parse::<u8>().map_err(|_| FrameError::InvalidText {
            reason: format!("{field:?} is not a byte value"),
        })?;
        data.put_u8(value);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(BridgeMessage::new(opcode, data.freeze()))
}

fn parse_binary(mut body: BytesMut) -> Result<BridgeMessage, FrameError> {
    if body.is_empty() {
        return Err(FrameError::TooShort { need: 1, got: 0 });
    }
    let opcode = body.get_u8();
    let opcode = BridgeOpcode::from_byte(opcode).ok_or(FrameError::UnknownOpcode(opcode))?;
    Ok(BridgeMessage::new(opcode, body.freeze()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Binary,
    Text,
}

/// Incremental decoder accepting both encodings on one stream.
///
/// Bytes outside a message are skipped; the first framing byte
/// (`0xFF` or `;`) selects how the message is read.
#[derive(Debug, Default)]
pub struct BridgeDecoder {
    input: BytesMut,
    body: BytesMut,
    framing: Option<Framing>,
    escape: bool,
}

impl BridgeDecoder {
    /// Creates a new decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds received bytes into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    /// Returns the number of unprocessed bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.input.len() + self.body.len()
    }

    /// Drops all buffered state.
    pub fn clear(&mut self) {
        self.input.clear();
        self.reset();
    }

    fn reset(&mut self) {
        self.body.clear();
        self.framing = None;
        self.escape = false;
    }

    fn finish(&mut self) -> Result<BridgeMessage, FrameError> {
        let framing = self.framing;
        let body = self.body.split();
        self.reset();
        match framing {
            Some(Framing::Text) => parse_text(&body),
            _ => parse_binary(body),
        }
    }

    /// Attempts to decode the next complete message.
    ///
    /// Returns `Ok(None)` when more data is needed. After an error the
    /// offending message is dropped and decoding can continue.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` for an oversized, empty or unparsable message.
    pub fn decode(&mut self) -> Result<Option<BridgeMessage>, FrameError> {
        while self.input.has_remaining() {
            let byte = self.input.get_u8();

            let Some(framing) = self.framing else {
                match byte {
                    START_BYTE => self.framing = Some(Framing::Binary),
                    MESSAGE_SEPARATOR => self.framing = Some(Framing::Text),
                    _ => tracing::trace!("skipping byte {byte:#04x} outside message"),
                }
                continue;
            };

            if self.escape {
                self.escape = false;
            } else {
                match (framing, byte) {
                    (_, ESCAPE_BYTE) => {
                        self.escape = true;
                        continue;
                    }
                    (Framing::Binary, START_BYTE) => {
                        tracing::debug!("restarting message after {} bytes", self.body.len());
                        self.body.clear();
                        continue;
                    }
                    (Framing::Binary, END_BYTE) | (Framing::Text, MESSAGE_SEPARATOR | b'\n') => {
                        return self.finish().map(Some);
                    }
                    _ => {}
                }
            }

            let limit = body_limit(framing);
            if self.body.len() >= limit {
                let size = self.body.len() + 1;
                self.reset();
                return Err(FrameError::TooLarge { size, max: limit });
            }
            self.body.put_u8(byte);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut BridgeDecoder) -> Vec<Result<BridgeMessage, FrameError>> {
        let mut out = Vec::new();
        loop {
            match decoder.decode() {
                Ok(Some(msg)) => out.push(Ok(msg)),
                Ok(None) => return out,
                Err(e) => out.push(Err(e)),
            }
        }
    }

    #[test]
    fn test_binary_escape_example() {
        let msg = BridgeMessage::new(BridgeOpcode::Msg, vec![0xFF, 0x10]);
        let wire = encode_binary(&msg);
        assert_eq!(
            &wire[..],
            &[START_BYTE, 0, ESCAPE_BYTE, 0xFF, 0x10, END_BYTE]
        );

        let mut decoder = BridgeDecoder::new();
        decoder.feed(&wire);
        assert_eq!(decoder.decode().unwrap(), Some(msg));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_every_byte_value_survives() {
        let data: Vec<u8> = (0..=u8::MAX).collect();
        let mut decoder = BridgeDecoder::new();
        for chunk in data.chunks(100) {
            let msg = BridgeMessage::new(BridgeOpcode::Msg, chunk.to_vec());
            decoder.feed(&encode_binary(&msg));
            assert_eq!(decoder.decode().unwrap(), Some(msg));
        }
    }

    #[test]
    fn test_special_bytes_always_escaped() {
        let msg = BridgeMessage::new(BridgeOpcode::Ok, vec![END_BYTE, ESCAPE_BYTE, START_BYTE]);
        assert_eq!(
            &encode_binary(&msg)[..],
            &[
                START_BYTE,
                4,
                ESCAPE_BYTE,
                END_BYTE,
                ESCAPE_BYTE,
                ESCAPE_BYTE,
                ESCAPE_BYTE,
                START_BYTE,
                END_BYTE
            ]
        );
    }

    #[test]
    fn test_partial_feed() {
        let msg = BridgeMessage::new(BridgeOpcode::Init, vec![3, 0x85, 0x83, 0xF7, 0x7E]);
        let wire = encode_binary(&msg);
        let mut decoder = BridgeDecoder::new();
        for (i, byte) in wire.iter().enumerate() {
            decoder.feed(&[*byte]);
            let result = decoder.decode().unwrap();
            if i + 1 < wire.len() {
                assert_eq!(result, None);
            } else {
                assert_eq!(result, Some(msg.clone()));
            }
        }
    }

    #[test]
    fn test_unescaped_start_restarts() {
        let mut decoder = BridgeDecoder::new();
        decoder.feed(&[START_BYTE, 0, 1, 2, START_BYTE, 4, 9, END_BYTE]);
        assert_eq!(
            decoder.decode().unwrap(),
            Some(BridgeMessage::new(BridgeOpcode::Ok, vec![9]))
        );
    }

    #[test]
    fn test_noise_between_messages_skipped() {
        let mut decoder = BridgeDecoder::new();
        decoder.feed(b"NRF24USB\r\n");
        decoder.feed(&encode_binary(&BridgeMessage::empty(BridgeOpcode::Ok)));
        let out = decode_all(&mut decoder);
        assert_eq!(out, vec![Ok(BridgeMessage::empty(BridgeOpcode::Ok))]);
    }

    #[test]
    fn test_binary_errors_recover() {
        let mut decoder = BridgeDecoder::new();
        decoder.feed(&[START_BYTE, END_BYTE, START_BYTE, 42, END_BYTE]);
        decoder.feed(&encode_binary(&BridgeMessage::empty(BridgeOpcode::Reboot)));
        let out = decode_all(&mut decoder);
        assert_eq!(
            out,
            vec![
                Err(FrameError::TooShort { need: 1, got: 0 }),
                Err(FrameError::UnknownOpcode(42)),
                Ok(BridgeMessage::empty(BridgeOpcode::Reboot)),
            ]
        );
    }

    #[test]
    fn test_oversize_dropped() {
        let mut decoder = BridgeDecoder::new();
        decoder.feed(&[START_BYTE, 0]);
        decoder.feed(&[0x11; MAX_MESSAGE_SIZE + 1]);
        decoder.feed(&[END_BYTE]);
        decoder.feed(&encode_binary(&BridgeMessage::empty(BridgeOpcode::Ok)));
        let out = decode_all(&mut decoder);
        assert_eq!(
            out[0],
            Err(FrameError::TooLarge {
                size: MAX_MESSAGE_SIZE + 2,
                max: MAX_MESSAGE_SIZE + 1,
            })
        );
        assert_eq!(out.last(), Some(&Ok(BridgeMessage::empty(BridgeOpcode::Ok))));
    }

    #[test]
    fn test_text_encoding() {
        let msg = BridgeMessage::new(BridgeOpcode::Init, vec![3, 133, 131, 247, 126]);
        assert_eq!(&encode_text(&msg)[..], b";INIT:3:133:131:247:126;\n");
        assert_eq!(
            &encode_text(&BridgeMessage::empty(BridgeOpcode::Reboot))[..],
            b";REBOOT;\n"
        );
    }

    #[test]
    fn test_text_round_trip() {
        let mut decoder = BridgeDecoder::new();
        let msg = BridgeMessage::new(BridgeOpcode::Msg, vec![0, 255, 10, 59]);
        decoder.feed(&encode(&msg, WireFormat::ClearText));
        assert_eq!(decoder.decode().unwrap(), Some(msg));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_full_data_in_both_framings() {
        let msg = BridgeMessage::new(BridgeOpcode::Payload, vec![0xFF; MAX_MESSAGE_SIZE]);
        let mut decoder = BridgeDecoder::new();
        decoder.feed(&encode_text(&msg));
        decoder.feed(&encode_binary(&msg));
        let out = decode_all(&mut decoder);
        assert_eq!(out, vec![Ok(msg.clone()), Ok(msg)]);
    }

    #[test]
    fn test_full_radio_frame_in_text() {
        let msg = BridgeMessage::new(BridgeOpcode::Msg, vec![0xFF; 32]);
        let wire = encode_text(&msg);
        assert!(wire.len() > MAX_MESSAGE_SIZE);
        let mut decoder = BridgeDecoder::new();
        decoder.feed(&wire);
        assert_eq!(decoder.decode().unwrap(), Some(msg));
    }

    #[test]
    fn test_text_too_many_values() {
        let mut decoder = BridgeDecoder::new();
        let mut wire = b";MSG".to_vec();
        for _ in 0..=MAX_MESSAGE_SIZE {
            wire.extend_from_slice(b":1");
        }
        wire.extend_from_slice(b";\n");
        decoder.feed(&wire);
        assert_eq!(
            decoder.decode(),
            Err(FrameError::TooLarge {
                size: MAX_MESSAGE_SIZE + 1,
                max: MAX_MESSAGE_SIZE,
            })
        );
    }

    #[test]
    fn test_text_variants() {
        let mut decoder = BridgeDecoder::new();
        // Trailing separator, newline terminator, escaped separator
        decoder.feed(b";OK:1:2:;");
        decoder.feed(b";SETTING:1\n");
        decoder.feed(b";INFO:5\xF0;9;");
        let out = decode_all(&mut decoder);
        assert_eq!(
            out,
            vec![
                Ok(BridgeMessage::new(BridgeOpcode::Ok, vec![1, 2])),
                Ok(BridgeMessage::new(BridgeOpcode::Setting, vec![1])),
                Err(FrameError::InvalidText {
                    reason: "\"5;9\" is not a byte value".into()
                }),
            ]
        );
    }

    #[test]
    fn test_text_unknown_name_is_error_sentinel() {
        let mut decoder = BridgeDecoder::new();
        decoder.feed(b";HELLO:1:2;\n");
        assert_eq!(
            decoder.decode().unwrap(),
            Some(BridgeMessage::empty(BridgeOpcode::Error))
        );
    }

    #[test]
    fn test_mixed_framings() {
        let mut decoder = BridgeDecoder::new();
        decoder.feed(&encode_text(&BridgeMessage::empty(BridgeOpcode::Ok)));
        decoder.feed(&encode_binary(&BridgeMessage::new(BridgeOpcode::Msg, vec![1])));
        let out = decode_all(&mut decoder);
        assert_eq!(
            out,
            vec![
                Ok(BridgeMessage::empty(BridgeOpcode::Ok)),
                Ok(BridgeMessage::new(BridgeOpcode::Msg, vec![1])),
            ]
        );
    }
}
