//! # rfmesh
//!
//! Pairing, framing and serial bridging for small packet-radio device meshes.
//!
//! Peripherals (light controllers, sensors, remotes) pair with a central hub
//! over an nRF24-class radio. A USB radio adapter exposes the same radio link
//! to a host computer.
//!
//! ## Features
//!
//! - Checksummed device, hub and remote-control frame codecs
//! - Broadcast-and-claim pairing with a persisted identity
//! - A device dispatch loop with UUID authentication and bounded retries
//! - A hub-side pairing responder
//! - The adapter's byte-stuffed and clear-text serial encodings, the adapter
//!   runtime and an async host client
//!
//! ## Quick Start
//!
//! A host talking to an adapter:
//!
//! ```no_run
//! use rfmesh::BridgeClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rfmesh::Error> {
//!     let mut client = BridgeClient::serial("/dev/ttyUSB0");
//!     let adapter = client.connect(101, 0).await?;
//!     println!("adapter {} firmware {}", adapter.uuid, adapter.firmware_version);
//!
//!     let mut frames = client.subscribe_received();
//!     while let Some(event) = frames.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! A device with its own driver, storage and control logic:
//!
//! ```no_run
//! # use rfmesh::{Controller, DeviceConfig, DeviceContext, IdentityStore, IoMode,
//! #     MemoryStorage, MockRadio, RadioLink, SetValue, Uuid};
//! struct Lamp(u8);
//!
//! impl Controller for Lamp {
//!     fn apply(&mut self, setting: &SetValue<'_>) {
//!         self.0 = setting.value.first().copied().unwrap_or(0);
//!     }
//!     fn snapshot(&self) -> Vec<u8> {
//!         vec![self.0]
//!     }
//! }
//!
//! # async fn run() -> rfmesh::Result<()> {
//! let config = DeviceConfig::new(Uuid::new([0xB8, 0x66, 0xA2, 0xD6]), "Lamp");
//! let link = RadioLink::new(MockRadio::new(), IoMode::Polling);
//! let store = IdentityStore::new(MemoryStorage::default())?;
//! let device = DeviceContext::new(config, link, store, Lamp(0))?;
//! match device.run().await {}
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Radio opcodes, checksum, frames and the set-value message
//! - [`types`] - UUIDs, identity and device configuration
//! - [`storage`] - Byte-addressed non-volatile storage and the identity store
//! - [`radio`] - Transceiver seam, retries, interrupt events and a mock radio
//! - [`device`] - Device runtime: pairing, dispatch and status reports
//! - [`hub`] - Hub-side pairing responder and device table
//! - [`bridge`] - Serial bridge encodings and the adapter runtime
//! - [`transport`] - Host-side transports (serial port, any async stream)
//! - [`event`] - Async event system for adapter messages
//! - [`commands`] - Command handler for adapter requests
//! - [`client`] - High-level [`BridgeClient`]

pub mod bridge;
pub mod client;
pub mod commands;
pub mod device;
pub mod error;
pub mod event;
pub mod hub;
pub mod protocol;
pub mod radio;
pub mod storage;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use bridge::{
    Adapter, AdapterConfig, AdapterExit, Announcement, BridgeDecoder, BridgeMessage, BridgeOpcode,
    HostRequest, Indicator, NoIndicator, WireFormat,
};
pub use client::BridgeClient;
pub use device::{
    Controller, DeviceContext, DiscardReason, Dispatch, RemoteTarget, ResetHandle,
};
pub use error::{Error, FrameError, Result};
pub use event::{BridgeEvent, EventDispatcher, EventFilter, Subscription};
pub use hub::{DeviceEntry, Hub, HubEvent, Outgoing};
pub use protocol::{
    ChangeType, Checked, DeviceFrame, HubFrame, Layer, Opcode, RemoteFrame, SetValue, sum16,
};
pub use radio::{IoMode, IrqEvents, IrqHandle, MockRadio, Radio, RadioEvent, RadioLink};
pub use storage::{IdentityStore, MemoryStorage, Storage};
pub use transport::{SerialConfig, SerialTransport, StreamTransport, Transport, list_ports};
pub use types::{
    BatteryCurve, DeviceConfig, PairingRecord, PairingState, PowerClass, Timings, Uuid,
};
