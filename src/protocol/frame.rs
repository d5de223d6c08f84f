//! Radio frame encoding and decoding.
//!
//! Every frame fits the 32-byte radio payload and ends with a checksum over
//! all bytes before it (see [`checksum`](super::checksum)).
//!
//! ```text
//! Device→Hub   ┌──────┬──────┬────┬────┬───────┬────────┬─────┬─────────┬──────┐
//!              │ addr │ uuid │ op │ fw │ power │ status │ seq │ payload │ sum  │
//!              │  1   │  4   │ 1  │ 1  │   1   │   1    │  1  │  0..20  │  2   │
//!              └──────┴──────┴────┴────┴───────┴────────┴─────┴─────────┴──────┘
//! Hub→Device   ┌──────┬──────┬────┬─────────┬──────┐
//!              │ addr │ uuid │ op │ payload │ sum  │
//!              │  1   │  4   │ 1  │  0..24  │  2   │
//!              └──────┴──────┴────┴─────────┴──────┘
//! Remote       ┌──────┬──────┬────┬─────────────┬───────┬───────┬──────┐
//!              │ addr │ uuid │ 6  │ target uuid │ layer │ value │ sum  │
//!              │  1   │  4   │ 1  │      4      │   1   │   1   │  2   │
//!              └──────┴──────┴────┴─────────────┴───────┴───────┴──────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::checksum::{self, CHECKSUM_LEN};
use crate::protocol::opcode::Opcode;
use crate::types::uuid::{UUID_LEN, Uuid};

/// Radio hardware payload ceiling.
pub const MAX_FRAME_SIZE: usize = 32;

/// Anything shorter is discarded before decoding.
pub const MIN_FRAME_SIZE: usize = 5;

/// Device→hub header length.
pub const DEVICE_HEADER_LEN: usize = 10;

/// Hub→device header length.
pub const HUB_HEADER_LEN: usize = 6;

/// Total length of a peer remote-control frame.
pub const REMOTE_FRAME_LEN: usize = 14;

/// Maximum device→hub payload.
pub const MAX_DEVICE_PAYLOAD: usize = MAX_FRAME_SIZE - DEVICE_HEADER_LEN - CHECKSUM_LEN;

/// Maximum hub→device payload.
pub const MAX_HUB_PAYLOAD: usize = MAX_FRAME_SIZE - HUB_HEADER_LEN - CHECKSUM_LEN;

/// A decoded frame together with its checksum verdict.
///
/// The frame is always fully decoded; callers must not act on it unless
/// [`is_valid`](Self::is_valid) holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checked<T> {
    frame: T,
    received: u16,
    computed: u16,
}

impl<T> Checked<T> {
    /// Returns true if the trailing checksum matches.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.received == self.computed
    }

    /// Returns the decoded frame regardless of validity.
    #[must_use]
    pub const fn frame(&self) -> &T {
        &self.frame
    }

    /// Returns the checksum carried by the frame.
    #[must_use]
    pub const fn received(&self) -> u16 {
        self.received
    }

    /// Returns the checksum computed over the received bytes.
    #[must_use]
    pub const fn computed(&self) -> u16 {
        self.computed
    }

    /// Returns the frame if its checksum matches.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::ChecksumMismatch` otherwise.
    pub fn verify(self) -> Result<T, FrameError> {
        if self.is_valid() {
            Ok(self.frame)
        } else {
            Err(FrameError::ChecksumMismatch {
                expected: self.computed,
                actual: self.received,
            })
        }
    }
}

/// Splits off the checksum after checking the length bounds of a shape.
fn split_checked(data: &[u8], min: usize) -> Result<(&[u8], u16, u16), FrameError> {
    if data.len() < min {
        return Err(FrameError::TooShort {
            need: min,
            got: data.len(),
        });
    }
    if data.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: data.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    checksum::split(data).ok_or(FrameError::TooShort {
        need: min,
        got: data.len(),
    })
}

fn get_uuid(buf: &mut &[u8]) -> Uuid {
    let mut bytes = [0u8; UUID_LEN];
    buf.copy_to_slice(&mut bytes);
    Uuid::new(bytes)
}

fn check_payload(len: usize, max: usize) -> Result<(), FrameError> {
    if len > max {
        return Err(FrameError::TooLarge { size: len, max });
    }
    Ok(())
}

/// Frame sent by a device to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFrame {
    /// Sender network address.
    pub address: u8,
    /// Sender UUID.
    pub uuid: Uuid,
    /// Raw opcode byte.
    pub opcode: u8,
    /// Firmware version.
    pub firmware_version: u8,
    /// Power indicator (0 = mains, otherwise battery level).
    pub power: u8,
    /// Self-reported status interval in seconds.
    pub status_interval: u8,
    /// Wrapping send counter.
    pub sequence: u8,
    /// Up to 20 payload bytes.
    pub payload: Bytes,
}

impl DeviceFrame {
    /// Returns the opcode if it is part of the enumeration.
    #[must_use]
    pub const fn opcode(&self) -> Option<Opcode> {
        Opcode::from_byte(self.opcode)
    }

    /// Encodes the frame including its checksum.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooLarge` if the payload exceeds 20 bytes.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        check_payload(self.payload.len(), MAX_DEVICE_PAYLOAD)?;

        let mut buf =
            BytesMut::with_capacity(DEVICE_HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        buf.put_u8(self.address);
        buf.put_slice(self.uuid.as_bytes());
        buf.put_u8(self.opcode);
        buf.put_u8(self.firmware_version);
        buf.put_u8(self.power);
        buf.put_u8(self.status_interval);
        buf.put_u8(self.sequence);
        buf.put_slice(&self.payload);
        checksum::append(&mut buf);
        Ok(buf.freeze())
    }

    /// Decodes a device→hub frame.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the buffer cannot hold this shape.
    pub fn decode(data: &[u8]) -> Result<Checked<Self>, FrameError> {
        let (body, received, computed) = split_checked(data, DEVICE_HEADER_LEN + CHECKSUM_LEN)?;

        let mut cursor = body;
        let address = cursor.get_u8();
        let uuid = get_uuid(&mut cursor);
        let opcode = cursor.get_u8();
        let firmware_version = cursor.get_u8();
        let power = cursor.get_u8();
        let status_interval = cursor.get_u8();
        let sequence = cursor.get_u8();
        let payload = Bytes::copy_from_slice(cursor);

        Ok(Checked {
            frame: Self {
                address,
                uuid,
                opcode,
                firmware_version,
                power,
                status_interval,
                sequence,
                payload,
            },
            received,
            computed,
        })
    }
}

/// Frame sent by the hub to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubFrame {
    /// Sender network address.
    pub address: u8,
    /// Sender (hub) UUID.
    pub uuid: Uuid,
    /// Raw opcode byte.
    pub opcode: u8,
    /// Up to 24 payload bytes.
    pub payload: Bytes,
}

impl HubFrame {
    /// Creates a hub frame.
    #[must_use]
    pub fn new(address: u8, uuid: Uuid, opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            address,
            uuid,
            opcode: opcode.as_byte(),
            payload: payload.into(),
        }
    }

    /// Returns the opcode if it is part of the enumeration.
    #[must_use]
    pub const fn opcode(&self) -> Option<Opcode> {
        Opcode::from_byte(self.opcode)
    }

    /// Encodes the frame including its checksum.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooLarge` if the payload exceeds 24 bytes.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        check_payload(self.payload.len(), MAX_HUB_PAYLOAD)?;

        let mut buf = BytesMut::with_capacity(HUB_HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        buf.put_u8(self.address);
        buf.put_slice(self.uuid.as_bytes());
        buf.put_u8(self.opcode);
        buf.put_slice(&self.payload);
        checksum::append(&mut buf);
        Ok(buf.freeze())
    }

    /// Decodes a hub→device frame.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the buffer cannot hold this shape.
    pub fn decode(data: &[u8]) -> Result<Checked<Self>, FrameError> {
        let (body, received, computed) = split_checked(data, HUB_HEADER_LEN + CHECKSUM_LEN)?;

        let mut cursor = body;
        let address = cursor.get_u8();
        let uuid = get_uuid(&mut cursor);
        let opcode = cursor.get_u8();
        let payload = Bytes::copy_from_slice(cursor);

        Ok(Checked {
            frame: Self {
                address,
                uuid,
                opcode,
                payload,
            },
            received,
            computed,
        })
    }
}

/// Peer-to-peer remote-control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFrame {
    /// Sender network address.
    pub address: u8,
    /// Sender UUID.
    pub uuid: Uuid,
    /// UUID of the controlled device.
    pub target_uuid: Uuid,
    /// Control axis.
    pub layer: u8,
    /// Axis value.
    pub value: u8,
}

impl RemoteFrame {
    /// Encodes the fixed 14-byte frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REMOTE_FRAME_LEN);
        buf.put_u8(self.address);
        buf.put_slice(self.uuid.as_bytes());
        buf.put_u8(Opcode::Remote.as_byte());
        buf.put_slice(self.target_uuid.as_bytes());
        buf.put_u8(self.layer);
        buf.put_u8(self.value);
        checksum::append(&mut buf);
        buf.freeze()
    }

    /// Decodes a remote-control frame from the first 14 bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the buffer is too short or too long, or the
    /// opcode byte is not `REMOTE`.
    pub fn decode(data: &[u8]) -> Result<Checked<Self>, FrameError> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let frame = data.get(..REMOTE_FRAME_LEN).ok_or(FrameError::TooShort {
            need: REMOTE_FRAME_LEN,
            got: data.len(),
        })?;
        let (body, received, computed) = split_checked(frame, REMOTE_FRAME_LEN)?;

        let mut cursor = body;
        let address = cursor.get_u8();
        let uuid = get_uuid(&mut cursor);
        let opcode = cursor.get_u8();
        if opcode != Opcode::Remote.as_byte() {
            return Err(FrameError::UnexpectedOpcode {
                expected: Opcode::Remote.as_byte(),
                got: opcode,
            });
        }
        let target_uuid = get_uuid(&mut cursor);
        let layer = cursor.get_u8();
        let value = cursor.get_u8();

        Ok(Checked {
            frame: Self {
                address,
                uuid,
                target_uuid,
                layer,
                value,
            },
            received,
            computed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_frame(payload: &[u8]) -> DeviceFrame {
        DeviceFrame {
            address: 7,
            uuid: Uuid::new([0xB8, 0x66, 0xA2, 0xD6]),
            opcode: Opcode::Status.as_byte(),
            firmware_version: 2,
            power: 0,
            status_interval: 5,
            sequence: 42,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_device_frame_layout() {
        let frame = device_frame(&[1, 127]).encode().unwrap();
        assert_eq!(
            &frame[..],
            &[
                7, 0xB8, 0x66, 0xA2, 0xD6, 5, 2, 0, 5, 42, 1, 127, // header + payload
                0x03, 0x53, // sum of the 12 preceding bytes = 851
            ]
        );
    }

    #[test]
    fn test_device_frame_round_trip_all_lengths() {
        for len in 0..=MAX_DEVICE_PAYLOAD {
            let payload: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            let frame = device_frame(&payload);
            let decoded = DeviceFrame::decode(&frame.encode().unwrap()).unwrap();
            assert!(decoded.is_valid());
            assert_eq!(decoded.frame(), &frame);
        }
    }

    #[test]
    fn test_device_frame_oversize_rejected() {
        let err = device_frame(&[0; MAX_DEVICE_PAYLOAD + 1]).encode().unwrap_err();
        assert_eq!(
            err,
            FrameError::TooLarge {
                size: 21,
                max: MAX_DEVICE_PAYLOAD
            }
        );
    }

    #[test]
    fn test_hub_frame_round_trip_all_lengths() {
        for len in 0..=MAX_HUB_PAYLOAD {
            let payload: Vec<u8> = (0..len as u8).collect();
            let frame = HubFrame::new(0, Uuid::new([1, 2, 3, 4]), Opcode::Set, payload);
            let encoded = frame.encode().unwrap();
            assert_eq!(encoded.len(), HUB_HEADER_LEN + len + CHECKSUM_LEN);
            let decoded = HubFrame::decode(&encoded).unwrap();
            assert!(decoded.is_valid());
            assert_eq!(decoded.verify().unwrap(), frame);
        }
    }

    #[test]
    fn test_hub_frame_oversize_rejected() {
        let frame = HubFrame::new(0, Uuid::ZERO, Opcode::Set, vec![0u8; 25]);
        assert!(matches!(
            frame.encode(),
            Err(FrameError::TooLarge { size: 25, max: 24 })
        ));
    }

    #[test]
    fn test_hub_frame_checksum_mismatch_still_decodes() {
        let frame = HubFrame::new(0, Uuid::new([1, 2, 3, 4]), Opcode::Init, vec![7]);
        let mut raw = frame.encode().unwrap().to_vec();
        raw[6] = 8;
        let decoded = HubFrame::decode(&raw).unwrap();
        assert!(!decoded.is_valid());
        assert_eq!(decoded.frame().payload[..], [8]);
        assert!(matches!(
            decoded.verify(),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_hub_frame_too_short() {
        assert!(matches!(
            HubFrame::decode(&[0, 1, 2, 3, 4, 5, 6]),
            Err(FrameError::TooShort { need: 8, got: 7 })
        ));
    }

    #[test]
    fn test_remote_frame_round_trip() {
        let frame = RemoteFrame {
            address: 12,
            uuid: Uuid::new([9, 9, 9, 9]),
            target_uuid: Uuid::new([0xB8, 0x66, 0xA2, 0xD6]),
            layer: 1,
            value: 200,
        };
        let encoded = frame.encode();
        assert_eq!(encoded.len(), REMOTE_FRAME_LEN);
        assert_eq!(encoded[5], Opcode::Remote.as_byte());
        let decoded = RemoteFrame::decode(&encoded).unwrap();
        assert!(decoded.is_valid());
        assert_eq!(decoded.verify().unwrap(), frame);
    }

    #[test]
    fn test_remote_frame_wrong_opcode() {
        let mut raw = RemoteFrame {
            address: 1,
            uuid: Uuid::ZERO,
            target_uuid: Uuid::ZERO,
            layer: 0,
            value: 0,
        }
        .encode()
        .to_vec();
        raw[5] = Opcode::Set.as_byte();
        assert!(matches!(
            RemoteFrame::decode(&raw),
            Err(FrameError::UnexpectedOpcode { expected: 6, got: 3 })
        ));
    }
}
