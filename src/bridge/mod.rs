//! Serial bridge between a host and a radio adapter.
//!
//! The adapter is a radio attached to a host over a byte stream. It relays
//! received radio frames to the host and transmits frames on the host's
//! behalf. This module contains:
//! - Bridge opcodes and messages
//! - The binary and clear-text wire encodings
//! - The adapter runtime ([`Adapter`])

pub mod adapter;
pub mod codec;
pub mod message;
pub mod opcode;

pub use adapter::{Adapter, AdapterConfig, AdapterExit, Indicator, NoIndicator};
pub use codec::{BridgeDecoder, encode, encode_binary, encode_text};
pub use message::{Announcement, BridgeMessage, HostRequest};
pub use opcode::BridgeOpcode;

/// Encoding of messages on the serial stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// Byte-stuffed binary framing.
    #[default]
    Binary,
    /// Human-readable `;NAME:v:v;` framing.
    ClearText,
}
