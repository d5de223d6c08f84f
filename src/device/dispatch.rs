//! Steady-state receive handling.

use std::time::Duration;

use crate::error::{Error, FrameError, Result};
use crate::protocol::{HubFrame, MIN_FRAME_SIZE, OPCODE_OFFSET, Opcode, RemoteFrame, SetValue};
use crate::radio::Radio;
use crate::storage::Storage;
use crate::types::PairingState;

use super::{Controller, DeviceContext, DiscardReason, Dispatch};

impl<R: Radio, S: Storage, C: Controller> DeviceContext<R, S, C> {
    /// Runs one iteration of the receive loop.
    ///
    /// Sends an unsolicited STATUS when the interval has elapsed, then handles
    /// at most one received frame. Malformed and unauthenticated frames are
    /// dropped and reported as [`Dispatch::Discarded`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the acknowledgement of an applied setting
    /// cannot be encoded.
    pub async fn poll(&mut self) -> Result<Dispatch> {
        self.status_if_due().await;

        let Some(data) = self.link.poll_receive() else {
            return Ok(Dispatch::Idle);
        };
        self.handle_frame(&data).await
    }

    async fn status_if_due(&mut self) {
        let interval = self.config.status_interval;
        if interval == 0 {
            return;
        }
        // Due once the interval is exceeded
        if self.last_status.elapsed() > Duration::from_secs(u64::from(interval)) {
            if let Err(e) = self.send_status(false).await {
                tracing::warn!("status report failed: {e}");
            }
        }
    }

    /// Handles one raw frame received from the radio.
    ///
    /// # Errors
    ///
    /// See [`poll`](Self::poll).
    pub async fn handle_frame(&mut self, data: &[u8]) -> Result<Dispatch> {
        if data.len() < MIN_FRAME_SIZE {
            tracing::warn!("discarding {}-byte frame", data.len());
            return Ok(Dispatch::Discarded(DiscardReason::TooShort(data.len())));
        }

        if self.config.allow_remote && data.get(OPCODE_OFFSET) == Some(&Opcode::Remote.as_byte()) {
            return Ok(self.handle_remote(data));
        }

        let frame = match HubFrame::decode(data) {
            Ok(checked) => match checked.verify() {
                Ok(frame) => frame,
                Err(FrameError::ChecksumMismatch { expected, actual }) => {
                    tracing::warn!("discarding frame with bad checksum");
                    return Ok(Dispatch::Discarded(DiscardReason::BadChecksum {
                        expected,
                        actual,
                    }));
                }
                Err(e) => return Ok(discard_malformed(e)),
            },
            Err(e) => return Ok(discard_malformed(e)),
        };

        if self.state != PairingState::Paired {
            tracing::warn!("discarding hub frame while unpaired");
            return Ok(Dispatch::Discarded(DiscardReason::NotPaired));
        }
        if frame.uuid != self.hub_uuid {
            tracing::warn!("discarding frame from unknown hub {}", frame.uuid);
            return Ok(Dispatch::Discarded(DiscardReason::UuidMismatch(frame.uuid)));
        }

        match frame.opcode() {
            Some(Opcode::Reset) => {
                tracing::info!("RESET received");
                self.reset();
                tokio::time::sleep(self.config.timings.reset_pause).await;
                Ok(Dispatch::Reset)
            }
            Some(Opcode::Set) => self.handle_set(&frame.payload).await,
            _ => {
                tracing::info!("unsupported opcode {} received", frame.opcode);
                Ok(Dispatch::Ignored(frame.opcode))
            }
        }
    }

    fn handle_remote(&mut self, data: &[u8]) -> Dispatch {
        let frame = match RemoteFrame::decode(data).and_then(|checked| checked.verify()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("discarding remote frame: {e}");
                return Dispatch::Discarded(DiscardReason::Malformed(e));
            }
        };

        // Remote frames are not authenticated against a UUID
        tracing::debug!(
            "remote input from {}: layer {} value {}",
            frame.uuid,
            frame.layer,
            frame.value
        );
        self.controller.remote(frame.layer, frame.value);
        Dispatch::Remote {
            layer: frame.layer,
            value: frame.value,
        }
    }

    async fn handle_set(&mut self, payload: &[u8]) -> Result<Dispatch> {
        let setting = match SetValue::parse(payload) {
            Ok(setting) => setting,
            Err(e) => {
                tracing::warn!("discarding SET: {e}");
                return Ok(Dispatch::Discarded(DiscardReason::InvalidSetValue(e)));
            }
        };

        tracing::debug!(
            "SET var {} {:?} {:?}",
            setting.var_index,
            setting.change,
            setting.value
        );
        self.controller.apply(&setting);
        if self.config.persist_state {
            self.store.save_state(&self.controller.snapshot());
        }

        let acknowledged = match self.send_status(true).await {
            Ok(()) => true,
            Err(Error::SendFailed { .. }) => {
                tracing::warn!("OK acknowledgement not delivered");
                false
            }
            Err(e) => return Err(e),
        };
        Ok(Dispatch::Applied {
            var_index: setting.var_index,
            acknowledged,
        })
    }
}

fn discard_malformed(error: FrameError) -> Dispatch {
    tracing::warn!("discarding malformed frame: {error}");
    Dispatch::Discarded(DiscardReason::Malformed(error))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::testing::*;
    use super::*;
    use crate::protocol::{ChangeType, DeviceFrame};
    use crate::storage::{IdentityStore, MemoryStorage};
    use crate::types::{UNPAIRED_ADDRESS, Uuid};

    fn hub_frame(uuid: Uuid, opcode: Opcode, payload: Vec<u8>) -> Vec<u8> {
        HubFrame::new(0, uuid, opcode, payload).encode().unwrap().to_vec()
    }

    fn set_frame(uuid: Uuid, var_index: u8, value: u8) -> Vec<u8> {
        let payload = SetValue::new(var_index, ChangeType::Set, &[value])
            .encode()
            .unwrap();
        hub_frame(uuid, Opcode::Set, payload.to_vec())
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_applies_and_acknowledges() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        radio.push_inbound(set_frame(HUB_UUID, 1, 200));

        let outcome = device.poll().await.unwrap();
        assert_eq!(
            outcome,
            Dispatch::Applied {
                var_index: 1,
                acknowledged: true
            }
        );
        assert_eq!(device.controller().levels, [0, 200, 0]);

        let sent = radio.sent();
        assert_eq!(sent.len(), 1);
        let ack = DeviceFrame::decode(&sent[0].data).unwrap().verify().unwrap();
        assert_eq!(ack.opcode(), Some(Opcode::Ok));
        assert_eq!(&ack.payload[..], &[0, 200, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_set_is_not_acknowledged() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        radio.push_inbound(hub_frame(HUB_UUID, Opcode::Set, vec![2, 1, 2, 200]));

        let outcome = device.poll().await.unwrap();
        assert!(matches!(
            outcome,
            Dispatch::Discarded(DiscardReason::InvalidSetValue(
                FrameError::ValueSizeMismatch { .. }
            ))
        ));
        assert_eq!(radio.send_attempts(), 0);
        assert_eq!(device.controller().levels, [0, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_ok_still_applies() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        radio.script_sends([false]);
        radio.push_inbound(set_frame(HUB_UUID, 0, 9));
        assert_eq!(
            device.poll().await.unwrap(),
            Dispatch::Applied {
                var_index: 0,
                acknowledged: false
            }
        );
        assert_eq!(device.controller().levels[0], 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uuid_mismatch_never_dispatched() {
        let stranger = Uuid::new([6, 6, 6, 6]);
        for opcode in [Opcode::Reset, Opcode::Set, Opcode::Init, Opcode::Status] {
            let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
            let payload = if opcode == Opcode::Set {
                vec![0, 1, 1, 50]
            } else {
                Vec::new()
            };
            radio.push_inbound(hub_frame(stranger, opcode, payload));

            let outcome = device.poll().await.unwrap();
            assert_eq!(
                outcome,
                Dispatch::Discarded(DiscardReason::UuidMismatch(stranger))
            );
            assert_eq!(device.state(), PairingState::Paired);
            assert_eq!(device.store().load().map(|r| r.address), Some(7));
            assert_eq!(device.controller().levels, [0, 0, 0]);
            assert_eq!(radio.send_attempts(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_from_hub() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        radio.push_inbound(hub_frame(HUB_UUID, Opcode::Reset, Vec::new()));

        let start = tokio::time::Instant::now();
        assert_eq!(device.poll().await.unwrap(), Dispatch::Reset);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(device.state(), PairingState::Unpaired);
        assert_eq!(device.address(), UNPAIRED_ADDRESS);
        assert_eq!(device.store().load(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_checksum_discarded() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        let mut frame = hub_frame(HUB_UUID, Opcode::Reset, Vec::new());
        frame[0] ^= 0x01;
        radio.push_inbound(frame);

        assert!(matches!(
            device.poll().await.unwrap(),
            Dispatch::Discarded(DiscardReason::BadChecksum { .. })
        ));
        assert_eq!(device.state(), PairingState::Paired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_and_unpaired_frames_discarded() {
        let (mut device, radio) = device_with(config(), MemoryStorage::new(64));
        radio.push_inbound(vec![1, 2, 3, 4]);
        radio.push_inbound(hub_frame(Uuid::ZERO, Opcode::Reset, Vec::new()));

        assert_eq!(
            device.poll().await.unwrap(),
            Dispatch::Discarded(DiscardReason::TooShort(4))
        );
        assert_eq!(
            device.poll().await.unwrap(),
            Dispatch::Discarded(DiscardReason::NotPaired)
        );
        assert_eq!(device.poll().await.unwrap(), Dispatch::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_opcode_ignored() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        radio.push_inbound(hub_frame(HUB_UUID, Opcode::Status, Vec::new()));
        let mut raw = hub_frame(HUB_UUID, Opcode::Status, Vec::new());
        raw[OPCODE_OFFSET] = 42;
        let sum = crate::protocol::sum16(&raw[..raw.len() - 2]);
        let n = raw.len();
        raw[n - 2..].copy_from_slice(&sum.to_be_bytes());
        radio.push_inbound(raw);

        assert_eq!(device.poll().await.unwrap(), Dispatch::Ignored(5));
        assert_eq!(device.poll().await.unwrap(), Dispatch::Ignored(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_frames() {
        let remote = RemoteFrame {
            address: 12,
            uuid: Uuid::new([9, 9, 9, 9]),
            target_uuid: DEVICE_UUID,
            layer: 2,
            value: 77,
        }
        .encode()
        .to_vec();

        let (mut device, radio) =
            device_with(config().allow_remote(true), paired_storage(7, HUB_UUID));
        radio.push_inbound(remote.clone());
        let mut corrupt = remote.clone();
        corrupt[12] ^= 0x40;
        radio.push_inbound(corrupt);

        assert_eq!(
            device.poll().await.unwrap(),
            Dispatch::Remote {
                layer: 2,
                value: 77
            }
        );
        assert!(matches!(
            device.poll().await.unwrap(),
            Dispatch::Discarded(DiscardReason::Malformed(
                FrameError::ChecksumMismatch { .. }
            ))
        ));
        assert_eq!(device.controller().remote_inputs, vec![(2, 77)]);

        // Without remote support the frame is treated as hub traffic
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        radio.push_inbound(remote);
        assert!(matches!(
            device.poll().await.unwrap(),
            Dispatch::Discarded(DiscardReason::UuidMismatch(_))
        ));
        assert!(device.controller().remote_inputs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_status() {
        let (mut device, radio) =
            device_with(config().status_interval(2), paired_storage(7, HUB_UUID));

        assert_eq!(device.poll().await.unwrap(), Dispatch::Idle);
        assert_eq!(radio.send_attempts(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        device.poll().await.unwrap();
        assert_eq!(radio.send_attempts(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        device.poll().await.unwrap();
        assert_eq!(radio.send_attempts(), 1);

        // Timer restarted by the send
        device.poll().await.unwrap();
        assert_eq!(radio.send_attempts(), 1);

        let status = DeviceFrame::decode(&radio.sent()[0].data)
            .unwrap()
            .verify()
            .unwrap();
        assert_eq!(status.opcode(), Some(Opcode::Status));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_status_when_interval_zero() {
        let (mut device, radio) = device_with(config(), paired_storage(7, HUB_UUID));
        tokio::time::advance(Duration::from_secs(600)).await;
        device.poll().await.unwrap();
        assert_eq!(radio.send_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_applied_setting_persisted() {
        let (mut device, radio) =
            device_with(config().persist_state(true), paired_storage(7, HUB_UUID));
        radio.push_inbound(set_frame(HUB_UUID, 2, 33));
        device.poll().await.unwrap();

        let store = IdentityStore::new(device.store().storage().clone()).unwrap();
        assert_eq!(store.load_state(3), Some(vec![0, 0, 33]));
    }
}
