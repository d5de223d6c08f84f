//! Persistent pairing record.
//!
//! Layout of the storage region:
//! ```text
//! offset 0      network address (255 = unpaired)
//! offset 1..5   hub UUID
//! offset 5..7   reserved
//! offset 7..    last state snapshot of the control logic
//! ```

use crate::error::{Error, Result};
use crate::storage::{ERASED, Storage};
use crate::types::identity::{PairingRecord, UNPAIRED_ADDRESS};
use crate::types::uuid::{UUID_LEN, Uuid};

const ADDRESS_OFFSET: usize = 0;
const HUB_UUID_OFFSET: usize = 1;
const STATE_OFFSET: usize = 7;

/// Minimum region size holding a pairing record.
pub const RECORD_LEN: usize = HUB_UUID_OFFSET + UUID_LEN;

/// Stores the pairing record at fixed offsets of a [`Storage`] region.
#[derive(Debug)]
pub struct IdentityStore<S> {
    storage: S,
}

impl<S: Storage> IdentityStore<S> {
    /// Wraps a storage region.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the region cannot hold a pairing record.
    pub fn new(storage: S) -> Result<Self> {
        if storage.len() < RECORD_LEN {
            return Err(Error::Storage {
                reason: format!(
                    "region of {} bytes cannot hold a {RECORD_LEN}-byte pairing record",
                    storage.len()
                ),
            });
        }
        Ok(Self { storage })
    }

    /// Reads the pairing record, `None` while unpaired.
    #[must_use]
    pub fn load(&self) -> Option<PairingRecord> {
        let address = self.storage.read_byte(ADDRESS_OFFSET);
        if address == UNPAIRED_ADDRESS {
            tracing::debug!("no pairing record stored");
            return None;
        }

        let mut uuid = [0u8; UUID_LEN];
        for (i, byte) in uuid.iter_mut().enumerate() {
            *byte = self.storage.read_byte(HUB_UUID_OFFSET + i);
        }
        Some(PairingRecord::new(address, Uuid::new(uuid)))
    }

    /// Writes the pairing record.
    ///
    /// Saving an identical record performs no physical writes.
    pub fn save(&mut self, record: &PairingRecord) {
        tracing::debug!(
            "saving pairing record: address {} hub {}",
            record.address,
            record.hub_uuid
        );
        self.storage.write_byte(ADDRESS_OFFSET, record.address);
        for (i, &byte) in record.hub_uuid.as_bytes().iter().enumerate() {
            self.storage.write_byte(HUB_UUID_OFFSET + i, byte);
        }
    }

    /// Erases the whole region to the unpaired sentinel.
    pub fn reset(&mut self) {
        tracing::info!("erasing pairing record");
        for offset in 0..self.storage.len() {
            self.storage.write_byte(offset, UNPAIRED_ADDRESS);
        }
    }

    /// Stores a state snapshot after the pairing record.
    ///
    /// Snapshots that do not fit the region are skipped with a warning.
    pub fn save_state(&mut self, snapshot: &[u8]) {
        if STATE_OFFSET + snapshot.len() > self.storage.len() {
            tracing::warn!(
                "state snapshot of {} bytes does not fit storage of {} bytes",
                snapshot.len(),
                self.storage.len()
            );
            return;
        }
        for (i, &byte) in snapshot.iter().enumerate() {
            self.storage.write_byte(STATE_OFFSET + i, byte);
        }
    }

    /// Reads a state snapshot of `len` bytes, `None` if the area is erased
    /// or too small.
    #[must_use]
    pub fn load_state(&self, len: usize) -> Option<Vec<u8>> {
        if len == 0 || STATE_OFFSET + len > self.storage.len() {
            return None;
        }
        let snapshot: Vec<u8> = (0..len)
            .map(|i| self.storage.read_byte(STATE_OFFSET + i))
            .collect();
        if snapshot.iter().all(|&b| b == ERASED) {
            return None;
        }
        Some(snapshot)
    }

    /// Returns the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }
}
