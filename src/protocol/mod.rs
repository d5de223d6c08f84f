//! Radio protocol definitions.
//!
//! This module contains the low-level protocol types including:
//! - Opcodes and remote-control layers
//! - The additive frame checksum
//! - Device→hub, hub→device and peer remote-control frames
//! - The set-value sub-message

pub mod checksum;
pub mod frame;
pub mod opcode;
pub mod set_value;

pub use checksum::{CHECKSUM_LEN, sum16};
pub use frame::{
    Checked, DeviceFrame, HubFrame, MAX_DEVICE_PAYLOAD, MAX_FRAME_SIZE, MAX_HUB_PAYLOAD,
    MIN_FRAME_SIZE, REMOTE_FRAME_LEN, RemoteFrame,
};
pub use opcode::{Layer, OPCODE_OFFSET, Opcode};
pub use set_value::{ChangeType, SetValue};
