//! Peripheral device runtime.
//!
//! A [`DeviceContext`] owns everything a device needs at runtime: its
//! configuration, the radio link, the identity store and the external control
//! logic. The main loop drives it through [`DeviceContext::run`], or step by
//! step through [`connect`](DeviceContext::connect) and
//! [`poll`](DeviceContext::poll).

mod dispatch;
mod pairing;

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::error::{Error, FrameError, Result};
use crate::protocol::{DeviceFrame, Opcode, RemoteFrame, SetValue};
use crate::radio::{Radio, RadioLink};
use crate::storage::{IdentityStore, Storage};
use crate::types::{DeviceConfig, PairingState, UNPAIRED_ADDRESS, Uuid};

/// Delay between two diagnostics of the fail-stop loop.
const FAIL_STOP_INTERVAL: Duration = Duration::from_secs(1);

/// The control logic a device exposes to the radio runtime.
pub trait Controller: Send {
    /// Applies a validated setting.
    fn apply(&mut self, setting: &SetValue<'_>);

    /// Returns the current state, sent as STATUS and OK payload (at most 20 bytes).
    fn snapshot(&self) -> Vec<u8>;

    /// Handles a peer remote-control input.
    fn remote(&mut self, layer: u8, value: u8) {
        tracing::debug!("ignoring remote input: layer {layer} value {value}");
    }

    /// Restores a state persisted before the last power loss.
    fn restore(&mut self, snapshot: &[u8]) {
        let _ = snapshot;
    }

    /// Returns the measured supply voltage of battery devices.
    fn battery_millivolts(&self) -> Option<u16> {
        None
    }
}

/// A local reset request, settable from an interrupt or another task.
#[derive(Debug, Clone, Default)]
pub struct ResetHandle(Arc<AtomicBool>);

impl ResetHandle {
    /// Creates a handle with no pending request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a reset.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true if a reset is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Consumes a pending request.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Peer addressed by a remote controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Network address of the controlled device.
    pub address: u8,
    /// UUID of the controlled device.
    pub uuid: Uuid,
}

/// Why a received frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Shorter than any frame shape.
    TooShort(usize),
    /// Could not be decoded as the expected shape.
    Malformed(FrameError),
    /// Trailing checksum mismatch.
    BadChecksum { expected: u16, actual: u16 },
    /// Hub traffic arrived before pairing.
    NotPaired,
    /// Sender UUID is not the paired hub.
    UuidMismatch(Uuid),
    /// SET payload is not a valid set-value sub-message.
    InvalidSetValue(FrameError),
}

/// Outcome of one receive poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing was received.
    Idle,
    /// A frame was received and dropped.
    Discarded(DiscardReason),
    /// A peer remote-control input was forwarded to the controller.
    Remote { layer: u8, value: u8 },
    /// The hub reset the pairing.
    Reset,
    /// A setting was applied; `acknowledged` tells whether the OK went out.
    Applied { var_index: u8, acknowledged: bool },
    /// An authenticated frame with an opcode the device does not handle.
    Ignored(u8),
}

/// Runtime state of one peripheral device.
pub struct DeviceContext<R, S, C> {
    config: DeviceConfig,
    link: RadioLink<R>,
    store: IdentityStore<S>,
    controller: C,
    address: u8,
    hub_uuid: Uuid,
    state: PairingState,
    sequence: u8,
    last_status: Instant,
    reset: ResetHandle,
    remote_target: Option<RemoteTarget>,
}

impl<R: Radio, S: Storage, C: Controller> DeviceContext<R, S, C> {
    /// Creates a device, loading its pairing record from the store.
    ///
    /// The link's retry ceiling is taken from the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(
        config: DeviceConfig,
        link: RadioLink<R>,
        store: IdentityStore<S>,
        mut controller: C,
    ) -> Result<Self> {
        config.validate()?;
        let link = link.with_retries(config.send_retries, config.timings.retry_delay);

        let (address, hub_uuid, state) = match store.load() {
            Some(record) => {
                tracing::info!(
                    "loaded pairing record: address {} hub {}",
                    record.address,
                    record.hub_uuid
                );
                (record.address, record.hub_uuid, PairingState::Paired)
            }
            None => (UNPAIRED_ADDRESS, Uuid::ZERO, PairingState::Unpaired),
        };

        if config.persist_state {
            let len = controller.snapshot().len();
            if let Some(saved) = store.load_state(len) {
                tracing::debug!("restoring {} bytes of saved state", saved.len());
                controller.restore(&saved);
            }
        }

        Ok(Self {
            config,
            link,
            store,
            controller,
            address,
            hub_uuid,
            state,
            sequence: 0,
            last_status: Instant::now(),
            reset: ResetHandle::new(),
            remote_target: None,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Returns the pairing state.
    #[must_use]
    pub const fn state(&self) -> PairingState {
        self.state
    }

    /// Returns the current network address.
    #[must_use]
    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Returns the paired hub UUID, zero while unpaired.
    #[must_use]
    pub const fn hub_uuid(&self) -> Uuid {
        self.hub_uuid
    }

    /// Returns the control logic.
    #[must_use]
    pub const fn controller(&self) -> &C {
        &self.controller
    }

    /// Returns the control logic mutably.
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Returns the identity store.
    #[must_use]
    pub const fn store(&self) -> &IdentityStore<S> {
        &self.store
    }

    /// Returns the radio link.
    #[must_use]
    pub const fn link(&self) -> &RadioLink<R> {
        &self.link
    }

    /// Returns a handle that requests a local reset.
    #[must_use]
    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }

    /// Sets the peer addressed by [`send_remote`](Self::send_remote).
    pub fn set_remote_target(&mut self, target: Option<RemoteTarget>) {
        self.remote_target = target;
    }

    /// Builds a device→hub frame and advances the sequence counter.
    fn frame(&mut self, opcode: Opcode, payload: impl Into<Bytes>) -> DeviceFrame {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        DeviceFrame {
            address: self.address,
            uuid: self.config.uuid,
            opcode: opcode.as_byte(),
            firmware_version: self.config.firmware_version,
            power: self
                .config
                .power
                .indicator(self.controller.battery_millivolts()),
            status_interval: self.config.status_interval,
            sequence,
            payload: payload.into(),
        }
    }

    /// Encodes and sends a device→hub frame to the hub.
    async fn send_to_hub(&mut self, opcode: Opcode, payload: impl Into<Bytes>) -> Result<()> {
        let data = self.frame(opcode, payload).encode()?;
        tracing::debug!("sending {opcode} ({} bytes) to hub", data.len());
        self.link
            .send_with_retry(self.config.hub_address, &data)
            .await
    }

    /// Sends the current state to the hub, as STATUS or as OK acknowledgement.
    ///
    /// The status timer restarts whether or not the send succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not fit a frame or every send
    /// attempt fails.
    pub async fn send_status(&mut self, ack: bool) -> Result<()> {
        let opcode = if ack { Opcode::Ok } else { Opcode::Status };
        let snapshot = self.controller.snapshot();
        let result = self.send_to_hub(opcode, snapshot).await;
        self.last_status = Instant::now();
        result
    }

    /// Sends a peer remote-control frame to the configured target.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoRemoteTarget` without a target, or
    /// `Error::SendFailed` if every attempt fails.
    pub async fn send_remote(&mut self, layer: impl Into<u8>, value: u8) -> Result<()> {
        let target = self.remote_target.ok_or(Error::NoRemoteTarget)?;
        let frame = RemoteFrame {
            address: self.address,
            uuid: self.config.uuid,
            target_uuid: target.uuid,
            layer: layer.into(),
            value,
        };
        tracing::debug!(
            "sending remote layer {} value {value} to {}",
            frame.layer,
            target.address
        );
        self.link
            .send_with_retry(target.address, &frame.encode())
            .await
    }

    /// Drives the device forever.
    ///
    /// Connects (pairing first when unpaired), then polls the radio. A
    /// reset from either side drops the device back into pairing. A radio
    /// that does not initialize stops the device in a diagnostic loop.
    pub async fn run(mut self) -> Infallible {
        let mut connected = false;
        loop {
            if !connected || self.state != PairingState::Paired {
                if let Err(e) = self.connect().await {
                    return fail_stop(&e).await;
                }
                connected = true;
            }

            if self.reset.take() {
                tracing::info!("local reset requested");
                self.reset();
                tokio::time::sleep(self.config.timings.reset_pause).await;
                continue;
            }

            match self.poll().await {
                Ok(Dispatch::Idle) => {
                    tokio::time::sleep(self.config.timings.poll_interval).await;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("poll failed: {e}"),
            }
        }
    }
}

/// Reports an unrecoverable hardware fault forever.
async fn fail_stop(error: &Error) -> Infallible {
    loop {
        tracing::error!("radio not responding, power cycle required: {error}");
        tokio::time::sleep(FAIL_STOP_INTERVAL).await;
    }
}

impl<R, S, C> std::fmt::Debug for DeviceContext<R, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("uuid", &self.config.uuid)
            .field("address", &self.address)
            .field("hub_uuid", &self.hub_uuid)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::protocol::{HubFrame, Layer, OPCODE_OFFSET};
    use crate::radio::MockRadio;
    use crate::storage::MemoryStorage;
    use crate::types::PairingRecord;
    use crate::types::{BatteryCurve, PowerClass};

    #[tokio::test]
    async fn test_new_loads_record() {
        let (device, _radio) = device_with(config(), paired_storage(7, HUB_UUID));
        assert_eq!(device.state(), PairingState::Paired);
        assert_eq!(device.address(), 7);
        assert_eq!(device.hub_uuid(), HUB_UUID);

        let (fresh, _radio) = device_with(config(), MemoryStorage::new(64));
        assert_eq!(fresh.state(), PairingState::Unpaired);
        assert_eq!(fresh.address(), UNPAIRED_ADDRESS);
        assert!(fresh.hub_uuid().is_zero());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let radio = MockRadio::new();
        let link = RadioLink::new(radio, crate::radio::IoMode::Polling);
        let store = IdentityStore::new(MemoryStorage::new(64)).unwrap();
        let result = DeviceContext::new(config().send_retries(0), link, store, Dimmer::default());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_send_status_frames() {
        let (mut device, radio) = device_with(
            config()
                .status_interval(5)
                .power(PowerClass::Battery(BatteryCurve::default())),
            paired_storage(7, HUB_UUID),
        );
        device.controller_mut().levels = [10, 20, 30];

        device.send_status(false).await.unwrap();
        device.send_status(true).await.unwrap();

        let sent = radio.sent();
        assert_eq!(sent.len(), 2);
        let status = DeviceFrame::decode(&sent[0].data).unwrap().verify().unwrap();
        assert_eq!(status.opcode(), Some(Opcode::Status));
        assert_eq!(status.address, 7);
        assert_eq!(status.uuid, DEVICE_UUID);
        assert_eq!(status.status_interval, 5);
        assert_eq!(status.power, 1);
        assert_eq!(&status.payload[..], &[10, 20, 30]);
        assert_eq!(sent[0].destination, 0);
        assert!(sent[0].require_ack);

        let ok = DeviceFrame::decode(&sent[1].data).unwrap().verify().unwrap();
        assert_eq!(ok.opcode(), Some(Opcode::Ok));
        assert_eq!(ok.sequence, status.sequence.wrapping_add(1));
    }

    #[tokio::test]
    async fn test_send_remote() {
        let (mut device, radio) = device_with(config(), paired_storage(12, HUB_UUID));
        assert!(matches!(
            device.send_remote(Layer::Axis1, 5).await,
            Err(Error::NoRemoteTarget)
        ));

        let target = RemoteTarget {
            address: 7,
            uuid: Uuid::new([9, 8, 7, 6]),
        };
        device.set_remote_target(Some(target));
        device.send_remote(Layer::Axis1, 5).await.unwrap();

        let sent = radio.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, 7);
        assert_eq!(sent[0].data[OPCODE_OFFSET], Opcode::Remote.as_byte());
        let frame = RemoteFrame::decode(&sent[0].data).unwrap().verify().unwrap();
        assert_eq!(frame.target_uuid, target.uuid);
        assert_eq!(frame.layer, 1);
        assert_eq!(frame.value, 5);
    }

    #[tokio::test]
    async fn test_restores_persisted_state() {
        let mut storage = paired_storage(7, HUB_UUID);
        {
            let mut store = IdentityStore::new(storage.clone()).unwrap();
            store.save_state(&[1, 2, 3]);
            storage = store.storage().clone();
        }
        let (device, _radio) = device_with(config().persist_state(true), storage.clone());
        assert_eq!(device.controller().levels, [1, 2, 3]);

        let (device, _radio) = device_with(config(), storage);
        assert_eq!(device.controller().levels, [0, 0, 0]);
    }

    #[test]
    fn test_reset_handle() {
        let handle = ResetHandle::new();
        assert!(!handle.is_pending());
        handle.clone().trigger();
        assert!(handle.is_pending());
        assert!(handle.take());
        assert!(!handle.take());
    }

    /// Storage shared between the running device and the test.
    #[derive(Clone)]
    struct SharedStorage(Arc<std::sync::Mutex<MemoryStorage>>);

    impl Storage for SharedStorage {
        fn read_byte(&self, offset: usize) -> u8 {
            self.0.lock().unwrap().read_byte(offset)
        }

        fn write_byte(&mut self, offset: usize, value: u8) {
            self.0.lock().unwrap().write_byte(offset, value);
        }

        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reset_repairs_with_new_identity() {
        let new_hub = Uuid::new([0xA0, 0xA1, 0xA2, 0xA3]);
        let storage = SharedStorage(Arc::new(std::sync::Mutex::new(paired_storage(
            9, HUB_UUID,
        ))));
        let radio = MockRadio::new();

        // Record on every INIT what the store held when it was sent
        let seen_at_init = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let storage = storage.clone();
            let seen_at_init = Arc::clone(&seen_at_init);
            radio.on_send(move |frame| {
                let request = DeviceFrame::decode(&frame.data).unwrap();
                if request.frame().opcode() != Some(Opcode::Init) {
                    return Vec::new();
                }
                let stored = IdentityStore::new(storage.clone()).unwrap().load();
                seen_at_init.lock().unwrap().push(stored);
                let reply = HubFrame::new(0, new_hub, Opcode::Init, vec![42]);
                vec![reply.encode().unwrap().to_vec()]
            });
        }

        let link = RadioLink::new(radio.clone(), crate::radio::IoMode::Polling);
        let store = IdentityStore::new(storage.clone()).unwrap();
        let device = DeviceContext::new(config(), link, store, Dimmer::default()).unwrap();
        let handle = device.reset_handle();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.trigger();
        });
        let result = tokio::time::timeout(Duration::from_secs(10), device.run()).await;
        assert!(result.is_err());
        trigger.await.unwrap();

        assert_eq!(seen_at_init.lock().unwrap().as_slice(), &[None]);
        assert_eq!(radio.init_calls(), vec![(9, 101), (255, 101), (42, 101)]);
        assert_eq!(
            IdentityStore::new(storage).unwrap().load(),
            Some(PairingRecord::new(42, new_hub))
        );

        let sent = radio.sent();
        let init = sent
            .iter()
            .map(|f| DeviceFrame::decode(&f.data).unwrap().verify().unwrap())
            .find(|f| f.opcode() == Some(Opcode::Init))
            .unwrap();
        assert_eq!(init.address, UNPAIRED_ADDRESS);
        let last_boot = sent
            .iter()
            .map(|f| DeviceFrame::decode(&f.data).unwrap().verify().unwrap())
            .filter(|f| f.opcode() == Some(Opcode::Boot))
            .last()
            .unwrap();
        assert_eq!(last_boot.address, 42);
        assert_eq!(&last_boot.payload[..], new_hub.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fail_stop_never_returns() {
        let (device, radio) = device_with(config(), MemoryStorage::new(64));
        radio.set_init_ok(false);
        let result =
            tokio::time::timeout(Duration::from_secs(30), device.run()).await;
        assert!(result.is_err());
        assert_eq!(radio.init_calls().len(), 1);
        assert_eq!(radio.send_attempts(), 0);
    }
}
