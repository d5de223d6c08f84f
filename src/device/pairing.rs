//! Pairing handshake and reset.

use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::{HubFrame, MIN_FRAME_SIZE, Opcode};
use crate::radio::Radio;
use crate::storage::Storage;
use crate::types::{PairingRecord, PairingState, UNPAIRED_ADDRESS, Uuid};

use super::{Controller, DeviceContext};

/// Result of one INIT round trip.
enum Attempt {
    Paired(PairingRecord),
    Retry,
}

impl<R: Radio, S: Storage, C: Controller> DeviceContext<R, S, C> {
    /// Pairs with the hub if needed, then announces the device.
    ///
    /// An unpaired device sends INIT until the hub answers with an address;
    /// there is no retry ceiling. Every path ends by re-initializing the radio
    /// with the assigned address and sending BOOT, whose delivery is not
    /// required.
    ///
    /// # Errors
    ///
    /// Returns `Error::RadioInit` if the transceiver does not respond.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != PairingState::Paired {
            self.pair().await?;
        }

        self.link.init(self.address, self.config.channel)?;
        let hub_uuid = self.hub_uuid;
        if let Err(e) = self.send_to_hub(Opcode::Boot, hub_uuid.as_bytes().to_vec()).await {
            tracing::warn!("BOOT announcement not delivered: {e}");
        }
        Ok(())
    }

    async fn pair(&mut self) -> Result<()> {
        self.state = PairingState::Pairing;
        self.address = UNPAIRED_ADDRESS;
        self.link.init(UNPAIRED_ADDRESS, self.config.channel)?;

        let device_type = self.config.device_type.clone().into_bytes();
        let init = self.frame(Opcode::Init, device_type).encode()?;

        let record = loop {
            tracing::info!("sending INIT to hub");
            match self.init_round_trip(&init).await {
                Attempt::Paired(record) => break record,
                Attempt::Retry => {}
            }
        };

        tracing::info!(
            "paired: address {} hub {}",
            record.address,
            record.hub_uuid
        );
        self.store.save(&record);
        if self.config.persist_state {
            self.store.save_state(&self.controller.snapshot());
        }
        self.address = record.address;
        self.hub_uuid = record.hub_uuid;
        self.state = PairingState::Paired;
        Ok(())
    }

    async fn init_round_trip(&mut self, init: &[u8]) -> Attempt {
        let timings = self.config.timings;

        if let Err(e) = self.link.send_with_retry(self.config.hub_address, init).await {
            tracing::warn!("hub not reachable: {e}");
            tokio::time::sleep(timings.pairing_backoff).await;
            return Attempt::Retry;
        }

        let start = Instant::now();
        loop {
            if let Some(data) = self.link.poll_receive() {
                if data.len() >= MIN_FRAME_SIZE {
                    return parse_reply(&data);
                }
                tracing::debug!("ignoring {}-byte frame while pairing", data.len());
            }
            if start.elapsed() > timings.response_window {
                tracing::warn!("timeout while waiting for the hub's reply");
                return Attempt::Retry;
            }
            tokio::time::sleep(timings.response_poll).await;
        }
    }

    /// Forgets the pairing.
    ///
    /// Clears the identity store; the device must pair again before it
    /// accepts hub traffic.
    pub fn reset(&mut self) {
        tracing::info!("resetting pairing");
        self.store.reset();
        self.address = UNPAIRED_ADDRESS;
        self.hub_uuid = Uuid::ZERO;
        self.state = PairingState::Unpaired;
    }
}

/// Interprets the hub's answer to INIT.
fn parse_reply(data: &[u8]) -> Attempt {
    let frame = match HubFrame::decode(data).and_then(|checked| checked.verify()) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("invalid pairing reply: {e}");
            return Attempt::Retry;
        }
    };

    match frame.payload.first() {
        Some(&address) if address != UNPAIRED_ADDRESS => {
            Attempt::Paired(PairingRecord::new(address, frame.uuid))
        }
        other => {
            tracing::warn!("pairing reply without a usable address: {other:?}");
            Attempt::Retry
        }
    }
}
