//! Error types for the rfmesh library.

use thiserror::Error;

/// The main error type for rfmesh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Protocol error reported by the other side.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Operation timed out waiting for a response.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The radio transceiver did not respond to initialisation.
    #[error("radio init failed (address {address}, channel {channel})")]
    RadioInit { address: u8, channel: u8 },

    /// Every send attempt went unacknowledged.
    #[error("send to address {destination} failed after {attempts} attempt(s)")]
    SendFailed { destination: u8, attempts: u8 },

    /// The device has no pairing record, or the hub does not know it.
    #[error("device is not paired")]
    NotPaired,

    /// A remote-control frame was requested without a configured peer.
    #[error("no remote target configured")]
    NoRemoteTarget,

    /// Non-volatile storage cannot hold the requested layout.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

/// Frame-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer too short to hold the frame shape.
    #[error("frame too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    /// Frame or payload exceeds its maximum size.
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Trailing checksum does not match the sum of the preceding bytes.
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Opcode byte does not match the decoded shape.
    #[error("unexpected opcode {got}, expected {expected}")]
    UnexpectedOpcode { expected: u8, got: u8 },

    /// Opcode byte is not part of the enumeration.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// Set-value payload shorter than the 3-byte header plus one value byte.
    #[error("set-value payload too short: {0} bytes")]
    SetValueTooShort(usize),

    /// Set-value change type outside `SET..=DECREASE`.
    #[error("invalid change type {0}")]
    InvalidChangeType(u8),

    /// Declared value size disagrees with the bytes present.
    #[error("set-value size mismatch: declared {declared}, present {present}")]
    ValueSizeMismatch { declared: usize, present: usize },

    /// Malformed clear-text bridge message.
    #[error("invalid clear-text message: {reason}")]
    InvalidText { reason: String },
}

/// Result type alias for rfmesh operations.
pub type Result<T> = std::result::Result<T, Error>;
