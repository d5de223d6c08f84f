//! Four-byte factory identifiers.

/// Length of a device or hub UUID in bytes.
pub const UUID_LEN: usize = 4;

/// A 4-byte factory-assigned identifier.
///
/// Not an RFC 4122 UUID; unique per physical unit only.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Uuid([u8; UUID_LEN]);

impl Uuid {
    /// The all-zero identifier held while a device is unpaired.
    pub const ZERO: Self = Self([0; UUID_LEN]);

    /// Creates a UUID from its bytes.
    #[must_use]
    pub const fn new(bytes: [u8; UUID_LEN]) -> Self {
        Self(bytes)
    }

    /// Tries to create a UUID from a slice.
    ///
    /// Returns `None` if the slice is not exactly 4 bytes.
    #[must_use]
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; UUID_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Returns the UUID as a byte slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; UUID_LEN] {
        &self.0
    }

    /// Returns true for the all-zero identifier.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; UUID_LEN]
    }

    /// Returns the UUID as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a UUID from a hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 8 characters.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::try_from_bytes(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }
}

impl From<[u8; UUID_LEN]> for Uuid {
    fn from(bytes: [u8; UUID_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uuid({})", self.to_hex())
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
