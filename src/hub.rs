//! Hub side of the radio protocol.
//!
//! [`Hub`] answers pairing requests, tracks the devices it has paired and
//! builds the frames it sends to them. It does no I/O; replies are handed
//! back as [`Outgoing`] frames for the caller to transmit (usually through a
//! serial bridge adapter).

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::{DeviceFrame, HubFrame, Opcode, SetValue};
use crate::types::{HUB_ADDRESS, UNPAIRED_ADDRESS, Uuid};

/// Lowest address handed out to devices.
pub const FIRST_DEVICE_ADDRESS: u8 = 1;

/// Highest address handed out to devices.
pub const LAST_DEVICE_ADDRESS: u8 = UNPAIRED_ADDRESS - 1;

/// An encoded frame and the address to send it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Destination radio address.
    pub destination: u8,
    /// Encoded frame.
    pub data: Bytes,
}

/// What the hub knows about a paired device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Assigned network address.
    pub address: u8,
    /// Type string sent with INIT.
    pub device_type: String,
    /// Firmware version from the last frame.
    pub firmware_version: u8,
    /// Power indicator from the last frame.
    pub power: u8,
    /// Self-reported status interval in seconds.
    pub status_interval: u8,
    /// Sequence counter of the last frame.
    pub sequence: u8,
    /// Last reported state snapshot.
    pub snapshot: Bytes,
}

impl DeviceEntry {
    /// Returns true for battery-powered devices.
    #[must_use]
    pub const fn is_battery_powered(&self) -> bool {
        self.power != 0
    }

    fn update_header(&mut self, frame: &DeviceFrame) {
        self.firmware_version = frame.firmware_version;
        self.power = frame.power;
        self.status_interval = frame.status_interval;
        self.sequence = frame.sequence;
    }
}

/// Result of handling one device frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A device asked to pair; send `reply` to complete it.
    Paired {
        uuid: Uuid,
        address: u8,
        reply: Outgoing,
    },
    /// A paired device announced itself.
    Booted { uuid: Uuid, address: u8 },
    /// A device reported its state, as STATUS or as acknowledgement of a SET.
    Status {
        uuid: Uuid,
        snapshot: Bytes,
        ack: bool,
    },
    /// The frame needs no action.
    Ignored { uuid: Uuid, opcode: u8 },
}

/// Pairing coordinator and device registry.
#[derive(Debug, Clone)]
pub struct Hub {
    uuid: Uuid,
    devices: HashMap<Uuid, DeviceEntry>,
}

impl Hub {
    /// Creates a hub with an empty registry.
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            devices: HashMap::new(),
        }
    }

    /// Returns the hub UUID.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Looks up a paired device.
    #[must_use]
    pub fn device(&self, uuid: &Uuid) -> Option<&DeviceEntry> {
        self.devices.get(uuid)
    }

    /// Iterates over all paired devices.
    pub fn devices(&self) -> impl Iterator<Item = (&Uuid, &DeviceEntry)> {
        self.devices.iter()
    }

    /// Removes a device from the registry, freeing its address.
    pub fn forget(&mut self, uuid: &Uuid) -> Option<DeviceEntry> {
        self.devices.remove(uuid)
    }

    fn free_address(&self) -> Option<u8> {
        (FIRST_DEVICE_ADDRESS..=LAST_DEVICE_ADDRESS)
            .find(|candidate| !self.devices.values().any(|d| d.address == *candidate))
    }

    /// Handles a frame received from a device.
    ///
    /// # Errors
    ///
    /// Returns `Error::Frame` for undecodable frames or a bad checksum, and
    /// `Error::Protocol` when the address pool is exhausted.
    pub fn handle_frame(&mut self, data: &[u8]) -> Result<HubEvent> {
        let frame = DeviceFrame::decode(data)?.verify()?;
        let uuid = frame.uuid;

        match frame.opcode() {
            Some(Opcode::Init) => self.pair(&frame),
            Some(Opcode::Boot) => {
                if frame.payload[..] != self.uuid.as_bytes()[..] {
                    tracing::warn!(
                        "device {uuid} booted paired to another hub ({})",
                        hex::encode(&frame.payload)
                    );
                }
                if let Some(entry) = self.devices.get_mut(&uuid) {
                    entry.update_header(&frame);
                    if entry.address != frame.address {
                        tracing::warn!(
                            "device {uuid} booted with address {}, registered {}",
                            frame.address,
                            entry.address
                        );
                    }
                } else {
                    tracing::warn!("unknown device {uuid} booted at address {}", frame.address);
                }
                Ok(HubEvent::Booted {
                    uuid,
                    address: frame.address,
                })
            }
            Some(op @ (Opcode::Status | Opcode::Ok)) => {
                if let Some(entry) = self.devices.get_mut(&uuid) {
                    entry.update_header(&frame);
                    entry.snapshot = frame.payload.clone();
                } else {
                    tracing::debug!("status from unregistered device {uuid}");
                }
                Ok(HubEvent::Status {
                    uuid,
                    snapshot: frame.payload,
                    ack: op == Opcode::Ok,
                })
            }
            _ => {
                tracing::debug!("ignoring opcode {} from {uuid}", frame.opcode);
                Ok(HubEvent::Ignored {
                    uuid,
                    opcode: frame.opcode,
                })
            }
        }
    }

    fn pair(&mut self, frame: &DeviceFrame) -> Result<HubEvent> {
        let uuid = frame.uuid;
        let device_type = String::from_utf8_lossy(&frame.payload).into_owned();

        let address = match self.devices.get(&uuid) {
            Some(entry) => {
                tracing::info!("device {uuid} paired again, keeping address {}", entry.address);
                entry.address
            }
            None => self.free_address().ok_or_else(|| Error::Protocol {
                message: "no free device address".into(),
            })?,
        };

        tracing::info!("pairing {device_type} {uuid} as address {address}");
        let mut entry = DeviceEntry {
            address,
            device_type,
            firmware_version: 0,
            power: 0,
            status_interval: 0,
            sequence: 0,
            snapshot: Bytes::new(),
        };
        entry.update_header(frame);
        self.devices.insert(uuid, entry);

        let data = HubFrame::new(HUB_ADDRESS, self.uuid, Opcode::Init, vec![address]).encode()?;
        Ok(HubEvent::Paired {
            uuid,
            address,
            reply: Outgoing {
                destination: frame.address,
                data,
            },
        })
    }

    fn registered(&self, uuid: &Uuid) -> Result<u8> {
        self.devices
            .get(uuid)
            .map(|d| d.address)
            .ok_or(Error::NotPaired)
    }

    /// Builds a SET frame for a paired device.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotPaired` for unknown devices and `Error::Frame` if
    /// the setting does not fit a frame.
    pub fn set(&self, device: &Uuid, setting: &SetValue<'_>) -> Result<Outgoing> {
        let destination = self.registered(device)?;
        let data = HubFrame::new(HUB_ADDRESS, self.uuid, Opcode::Set, setting.encode()?).encode()?;
        Ok(Outgoing { destination, data })
    }

    /// Builds a RESET frame for a paired device and forgets it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotPaired` for unknown devices.
    pub fn reset(&mut self, device: &Uuid) -> Result<Outgoing> {
        let destination = self.registered(device)?;
        let data = HubFrame::new(HUB_ADDRESS, self.uuid, Opcode::Reset, Bytes::new()).encode()?;
        self.devices.remove(device);
        Ok(Outgoing { destination, data })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::device::testing::{DEVICE_UUID, device_with};
    use crate::device::Dispatch;
    use crate::protocol::ChangeType;
    use crate::storage::MemoryStorage;
    use crate::types::{DeviceConfig, PairingState};

    const HUB: Uuid = Uuid::new([0xA1, 0xB2, 0xC3, 0xD4]);

    fn init_frame(uuid: Uuid, device_type: &str) -> Bytes {
        DeviceFrame {
            address: UNPAIRED_ADDRESS,
            uuid,
            opcode: Opcode::Init.as_byte(),
            firmware_version: 3,
            power: 0,
            status_interval: 10,
            sequence: 0,
            payload: Bytes::copy_from_slice(device_type.as_bytes()),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_assigns_smallest_free_address() {
        let mut hub = Hub::new(HUB);
        let a = Uuid::new([1, 1, 1, 1]);
        let b = Uuid::new([2, 2, 2, 2]);
        let c = Uuid::new([3, 3, 3, 3]);

        for (uuid, expected) in [(a, 1), (b, 2), (c, 3)] {
            let HubEvent::Paired { address, reply, .. } =
                hub.handle_frame(&init_frame(uuid, "Sensor")).unwrap()
            else {
                panic!("expected pairing");
            };
            assert_eq!(address, expected);
            assert_eq!(reply.destination, UNPAIRED_ADDRESS);
            let frame = HubFrame::decode(&reply.data).unwrap().verify().unwrap();
            assert_eq!(frame.uuid, HUB);
            assert_eq!(&frame.payload[..], &[expected]);
        }

        hub.forget(&b);
        let d = Uuid::new([4, 4, 4, 4]);
        let event = hub.handle_frame(&init_frame(d, "Sensor")).unwrap();
        assert!(matches!(event, HubEvent::Paired { address: 2, .. }));

        // Known UUID keeps its address
        let event = hub.handle_frame(&init_frame(a, "Sensor")).unwrap();
        assert!(matches!(event, HubEvent::Paired { address: 1, .. }));
        assert_eq!(hub.device(&d).unwrap().device_type, "Sensor");
        assert_eq!(hub.device(&a).unwrap().status_interval, 10);
    }

    #[test]
    fn test_address_pool_exhausted() {
        let mut hub = Hub::new(HUB);
        for i in FIRST_DEVICE_ADDRESS..=LAST_DEVICE_ADDRESS {
            hub.handle_frame(&init_frame(Uuid::new([i, 0, 0, 1]), "X"))
                .unwrap();
        }
        assert!(matches!(
            hub.handle_frame(&init_frame(Uuid::new([0, 0, 0, 2]), "X")),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut hub = Hub::new(HUB);
        let mut raw = init_frame(DEVICE_UUID, "Sensor").to_vec();
        raw[3] ^= 0x10;
        assert!(matches!(hub.handle_frame(&raw), Err(Error::Frame(_))));
        assert_eq!(hub.devices().count(), 0);
    }

    #[test]
    fn test_set_and_reset_frames() {
        let mut hub = Hub::new(HUB);
        hub.handle_frame(&init_frame(DEVICE_UUID, "Dimmer")).unwrap();

        let out = hub
            .set(&DEVICE_UUID, &SetValue::new(2, ChangeType::Set, &[200]))
            .unwrap();
        assert_eq!(out.destination, 1);
        let frame = HubFrame::decode(&out.data).unwrap().verify().unwrap();
        assert_eq!(frame.opcode(), Some(Opcode::Set));
        assert_eq!(&frame.payload[..], &[2, 1, 1, 200]);

        let out = hub.reset(&DEVICE_UUID).unwrap();
        let frame = HubFrame::decode(&out.data).unwrap().verify().unwrap();
        assert_eq!(frame.opcode(), Some(Opcode::Reset));
        assert!(hub.device(&DEVICE_UUID).is_none());
        assert!(matches!(hub.reset(&DEVICE_UUID), Err(Error::NotPaired)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_pairs_with_hub() {
        let hub = Arc::new(Mutex::new(Hub::new(HUB)));
        let (mut device, radio) = device_with(
            DeviceConfig::new(DEVICE_UUID, "LedController3Ch").status_interval(5),
            MemoryStorage::new(64),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let hub = Arc::clone(&hub);
            let events = Arc::clone(&events);
            radio.on_send(move |sent| {
                let event = hub.lock().unwrap().handle_frame(&sent.data).unwrap();
                let reply = match &event {
                    HubEvent::Paired { reply, .. } => vec![reply.data.to_vec()],
                    _ => Vec::new(),
                };
                events.lock().unwrap().push(event);
                reply
            });
        }

        device.connect().await.unwrap();
        assert_eq!(device.state(), PairingState::Paired);
        assert_eq!(device.address(), 1);
        assert_eq!(device.hub_uuid(), HUB);

        {
            let events = events.lock().unwrap();
            assert_eq!(events.len(), 2);
            assert!(matches!(events[1], HubEvent::Booted { address: 1, .. }));
        }

        // Hub drives a setting through the device
        let set = hub
            .lock()
            .unwrap()
            .set(&DEVICE_UUID, &SetValue::new(0, ChangeType::Set, &[42]))
            .unwrap();
        radio.push_inbound(set.data.to_vec());
        assert!(matches!(
            device.poll().await.unwrap(),
            Dispatch::Applied { var_index: 0, acknowledged: true }
        ));
        let entry = hub.lock().unwrap().device(&DEVICE_UUID).cloned().unwrap();
        assert_eq!(&entry.snapshot[..], &[42, 0, 0]);
        assert!(matches!(
            events.lock().unwrap().last(),
            Some(HubEvent::Status { ack: true, .. })
        ));
    }
}
