//! Data types shared by the device, hub and bridge sides.
//!
//! This module contains:
//! - Four-byte UUIDs
//! - Network identity (addresses, pairing record, pairing state)
//! - Runtime device configuration

pub mod config;
pub mod identity;
pub mod uuid;

pub use config::{BatteryCurve, DeviceConfig, PowerClass, Timings};
pub use identity::{DEFAULT_CHANNEL, HUB_ADDRESS, PairingRecord, PairingState, UNPAIRED_ADDRESS};
pub use uuid::{UUID_LEN, Uuid};
