//! Set-value sub-message carried in the payload of a `SET` frame.
//!
//! ```text
//! [var_index:1] [change_type:1] [value_size:1] [value:value_size]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::frame::MAX_HUB_PAYLOAD;

/// Header bytes in front of the value.
pub const SET_VALUE_HEADER_LEN: usize = 3;

/// Operation requested by a set-value sub-message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChangeType {
    /// Absolute set.
    Set = 1,
    /// Flip a boolean.
    Toggle = 2,
    /// Relative increase.
    Increase = 3,
    /// Relative decrease.
    Decrease = 4,
}

impl ChangeType {
    /// Attempts to parse a change type. `0` (invalid) and unknown values yield `None`.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Set),
            2 => Some(Self::Toggle),
            3 => Some(Self::Increase),
            4 => Some(Self::Decrease),
            _ => None,
        }
    }
}

impl From<ChangeType> for u8 {
    fn from(change: ChangeType) -> Self {
        change as Self
    }
}

/// A validated set-value sub-message borrowing its value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetValue<'a> {
    /// Index of the variable in the device's state.
    pub var_index: u8,
    /// Requested operation.
    pub change: ChangeType,
    /// New value bytes.
    pub value: &'a [u8],
}

impl<'a> SetValue<'a> {
    /// Creates a set-value message.
    #[must_use]
    pub const fn new(var_index: u8, change: ChangeType, value: &'a [u8]) -> Self {
        Self {
            var_index,
            change,
            value,
        }
    }

    /// Parses and validates a sub-message from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the payload is shorter than 4 bytes, the
    /// change type is not `SET..=DECREASE`, or the declared value size does not
    /// account for exactly the bytes after the 3-byte header.
    pub fn parse(payload: &'a [u8]) -> Result<Self, FrameError> {
        if payload.len() < SET_VALUE_HEADER_LEN + 1 {
            return Err(FrameError::SetValueTooShort(payload.len()));
        }

        let var_index = payload[0];
        let change =
            ChangeType::from_byte(payload[1]).ok_or(FrameError::InvalidChangeType(payload[1]))?;
        let declared = usize::from(payload[2]);
        let value = &payload[SET_VALUE_HEADER_LEN..];
        if value.len() != declared {
            return Err(FrameError::ValueSizeMismatch {
                declared,
                present: value.len(),
            });
        }

        Ok(Self {
            var_index,
            change,
            value,
        })
    }

    /// Encodes the sub-message for a `SET` frame payload.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooLarge` if the result would not fit a hub frame,
    /// or `FrameError::SetValueTooShort` for an empty value.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let size = SET_VALUE_HEADER_LEN + self.value.len();
        if self.value.is_empty() {
            return Err(FrameError::SetValueTooShort(size));
        }
        if size > MAX_HUB_PAYLOAD {
            return Err(FrameError::TooLarge {
                size,
                max: MAX_HUB_PAYLOAD,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(self.var_index);
        buf.put_u8(self.change.into());
        // size <= MAX_HUB_PAYLOAD, so the value length fits a byte
        buf.put_u8(self.value.len() as u8);
        buf.put_slice(self.value);
        Ok(buf.freeze())
    }
}
