//! Network identity of a device.

use crate::types::uuid::Uuid;

/// Network address meaning "not paired".
pub const UNPAIRED_ADDRESS: u8 = 255;

/// Well-known address of the hub.
pub const HUB_ADDRESS: u8 = 0;

/// Radio channel used when none is configured.
pub const DEFAULT_CHANNEL: u8 = 101;

/// The persisted result of a successful pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingRecord {
    /// Address assigned by the hub.
    pub address: u8,
    /// UUID of the hub that assigned it.
    pub hub_uuid: Uuid,
}

impl PairingRecord {
    /// Creates a new pairing record.
    #[must_use]
    pub const fn new(address: u8, hub_uuid: Uuid) -> Self {
        Self { address, hub_uuid }
    }
}

/// Pairing state machine states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairingState {
    /// No pairing record; the device answers nothing but the handshake.
    #[default]
    Unpaired,
    /// Handshake in progress.
    Pairing,
    /// A pairing record exists and hub traffic is authenticated against it.
    Paired,
}
