//! Bridge messages and the requests a host can make.

use bytes::{BufMut, Bytes, BytesMut};

use crate::bridge::opcode::BridgeOpcode;
use crate::bridge::WireFormat;
use crate::error::FrameError;
use crate::types::Uuid;

/// One decoded bridge message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMessage {
    /// Message type.
    pub opcode: BridgeOpcode,
    /// Unescaped data bytes.
    pub data: Bytes,
}

impl BridgeMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(opcode: BridgeOpcode, data: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            data: data.into(),
        }
    }

    /// Creates a message carrying text.
    #[must_use]
    pub fn text(opcode: BridgeOpcode, text: &str) -> Self {
        Self::new(opcode, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Creates a message without data.
    #[must_use]
    pub const fn empty(opcode: BridgeOpcode) -> Self {
        Self {
            opcode,
            data: Bytes::new(),
        }
    }

    /// Returns the data as lossy UTF-8, for ERROR/OK/INFO text.
    #[must_use]
    pub fn data_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// The adapter's power-up announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    /// Adapter firmware version.
    pub firmware_version: u8,
    /// Adapter UUID.
    pub uuid: Uuid,
}

impl Announcement {
    /// Length of the announcement data.
    pub const LEN: usize = 5;

    /// Encodes the announcement as an INIT message.
    #[must_use]
    pub fn to_message(&self) -> BridgeMessage {
        let mut data = BytesMut::with_capacity(Self::LEN);
        data.put_u8(self.firmware_version);
        data.put_slice(self.uuid.as_bytes());
        BridgeMessage::new(BridgeOpcode::Init, data.freeze())
    }

    /// Parses an INIT message sent by an adapter.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the message is not a 5-byte INIT.
    pub fn from_message(msg: &BridgeMessage) -> Result<Self, FrameError> {
        if msg.opcode != BridgeOpcode::Init {
            return Err(FrameError::UnexpectedOpcode {
                expected: BridgeOpcode::Init.as_byte(),
                got: msg.opcode.as_byte(),
            });
        }
        if msg.data.len() != Self::LEN {
            return Err(FrameError::TooShort {
                need: Self::LEN,
                got: msg.data.len(),
            });
        }
        let uuid = Uuid::try_from_bytes(&msg.data[1..]).ok_or(FrameError::TooShort {
            need: Self::LEN,
            got: msg.data.len(),
        })?;
        Ok(Self {
            firmware_version: msg.data[0],
            uuid,
        })
    }
}

/// A request from the host to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Initialize the radio.
    Init {
        channel: u8,
        address: u8,
        /// Switch the adapter's output encoding.
        format: Option<WireFormat>,
        /// Blink on radio activity.
        blink: Option<bool>,
    },
    /// Relay a frame over the radio.
    Msg {
        destination: u8,
        require_ack: bool,
        payload: Bytes,
    },
    /// Change the blink flag.
    Setting { blink: bool },
    /// Restart the adapter.
    Reboot,
}

impl HostRequest {
    /// Parses a host request.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooShort` if the data is shorter than the request
    /// layout, or `FrameError::UnexpectedOpcode` for adapter-only opcodes.
    pub fn parse(msg: &BridgeMessage) -> Result<Self, FrameError> {
        let data = &msg.data[..];
        let need = |need: usize| {
            if data.len() < need {
                Err(FrameError::TooShort {
                    need,
                    got: data.len(),
                })
            } else {
                Ok(())
            }
        };

        match msg.opcode {
            BridgeOpcode::Init => {
                need(2)?;
                Ok(Self::Init {
                    channel: data[0],
                    address: data[1],
                    format: data.get(2).map(|&b| {
                        if b == 0 {
                            WireFormat::Binary
                        } else {
                            WireFormat::ClearText
                        }
                    }),
                    blink: data.get(3).map(|&b| b != 0),
                })
            }
            BridgeOpcode::Msg => {
                need(3)?;
                Ok(Self::Msg {
                    destination: data[0],
                    require_ack: data[1] != 0,
                    payload: msg.data.slice(2..),
                })
            }
            BridgeOpcode::Setting => {
                need(1)?;
                Ok(Self::Setting {
                    blink: data[0] != 0,
                })
            }
            BridgeOpcode::Reboot => Ok(Self::Reboot),
            other => Err(FrameError::UnexpectedOpcode {
                expected: BridgeOpcode::Msg.as_byte(),
                got: other.as_byte(),
            }),
        }
    }

    /// Encodes the request as a bridge message.
    #[must_use]
    pub fn to_message(&self) -> BridgeMessage {
        match self {
            Self::Init {
                channel,
                address,
                format,
                blink,
            } => {
                let mut data = BytesMut::with_capacity(4);
                data.put_u8(*channel);
                data.put_u8(*address);
                if format.is_some() || blink.is_some() {
                    data.put_u8(u8::from(*format == Some(WireFormat::ClearText)));
                }
                if let Some(blink) = blink {
                    data.put_u8(u8::from(*blink));
                }
                BridgeMessage::new(BridgeOpcode::Init, data.freeze())
            }
            Self::Msg {
                destination,
                require_ack,
                payload,
            } => {
                let mut data = BytesMut::with_capacity(2 + payload.len());
                data.put_u8(*destination);
                data.put_u8(u8::from(*require_ack));
                data.put_slice(payload);
                BridgeMessage::new(BridgeOpcode::Msg, data.freeze())
            }
            Self::Setting { blink } => {
                BridgeMessage::new(BridgeOpcode::Setting, vec![u8::from(*blink)])
            }
            Self::Reboot => BridgeMessage::empty(BridgeOpcode::Reboot),
        }
    }
}
