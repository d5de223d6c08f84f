//! Non-volatile storage.
//!
//! Devices keep their pairing record in a small flat byte region (EEPROM or
//! an emulated flash page). Implementations of [`Storage`] provide
//! byte-addressed access; [`IdentityStore`] lays the pairing record out on top.

pub mod identity;

pub use identity::IdentityStore;

/// Value of an erased storage byte.
pub const ERASED: u8 = 0xFF;

/// Byte-addressed non-volatile storage.
pub trait Storage: Send {
    /// Reads the byte at `offset`.
    fn read_byte(&self, offset: usize) -> u8;

    /// Writes `value` at `offset`.
    ///
    /// Implementations skip the physical write when the stored byte already
    /// equals `value`.
    fn write_byte(&mut self, offset: usize, value: u8);

    /// Size of the region in bytes.
    fn len(&self) -> usize;

    /// Returns true if the region holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAM-backed storage, initially erased.
///
/// Counts physical writes so wear can be observed.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
    writes: usize,
}

impl MemoryStorage {
    /// Creates an erased region of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![ERASED; len],
            writes: 0,
        }
    }

    /// Returns the number of physical byte writes performed.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the raw region.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for MemoryStorage {
    /// 1 KiB, the EEPROM size of the common 8-bit targets.
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Storage for MemoryStorage {
    fn read_byte(&self, offset: usize) -> u8 {
        self.bytes.get(offset).copied().unwrap_or(ERASED)
    }

    fn write_byte(&mut self, offset: usize, value: u8) {
        if let Some(byte) = self.bytes.get_mut(offset) {
            if *byte != value {
                *byte = value;
                self.writes += 1;
            }
        } else {
            tracing::warn!("storage write at offset {offset} beyond region of {} bytes", self.bytes.len());
        }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}
