//! Opcode definitions for the radio protocol.
//!
//! Device→hub and hub→device frames share one numeric opcode space.
//! The opcode sits at byte offset 5 of every frame shape.

/// Byte offset of the opcode in every frame shape.
pub const OPCODE_OFFSET: usize = 5;

/// Radio frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Error report (used by the serial bridge, never sent by devices).
    Error = 0,
    /// Pairing request (device) or pairing reply carrying the new address (hub).
    Init = 1,
    /// Announcement after (re)connecting, payload is the hub UUID.
    Boot = 2,
    /// Apply a setting, payload is a set-value sub-message.
    Set = 3,
    /// Drop the pairing record.
    Reset = 4,
    /// Unsolicited state snapshot.
    Status = 5,
    /// Peer remote-control frame.
    Remote = 6,
    /// Acknowledgement of a SET, payload is the state snapshot.
    Ok = 7,
}

impl Opcode {
    /// Attempts to parse an opcode from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Error),
            1 => Some(Self::Init),
            2 => Some(Self::Boot),
            3 => Some(Self::Set),
            4 => Some(Self::Reset),
            5 => Some(Self::Status),
            6 => Some(Self::Remote),
            7 => Some(Self::Ok),
            _ => None,
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as Self
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Error => "ERROR",
            Self::Init => "INIT",
            Self::Boot => "BOOT",
            Self::Set => "SET",
            Self::Reset => "RESET",
            Self::Status => "STATUS",
            Self::Remote => "REMOTE",
            Self::Ok => "OK",
        };
        f.write_str(name)
    }
}

/// Control axis carried by a peer remote-control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Layer {
    /// Push buttons.
    Buttons = 0,
    /// Analog axis 1.
    Axis1 = 1,
    /// Analog axis 2.
    Axis2 = 2,
    /// Analog axis 3.
    Axis3 = 3,
    /// Analog axis 4.
    Axis4 = 4,
    /// Analog axis 5.
    Axis5 = 5,
    /// Analog axis 6.
    Axis6 = 6,
    /// Analog axis 7.
    Axis7 = 7,
    /// Analog axis 8.
    Axis8 = 8,
    /// Analog axis 9.
    Axis9 = 9,
}

impl Layer {
    /// Attempts to parse a layer from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Buttons),
            1 => Some(Self::Axis1),
            2 => Some(Self::Axis2),
            3 => Some(Self::Axis3),
            4 => Some(Self::Axis4),
            5 => Some(Self::Axis5),
            6 => Some(Self::Axis6),
            7 => Some(Self::Axis7),
            8 => Some(Self::Axis8),
            9 => Some(Self::Axis9),
            _ => None,
        }
    }
}

impl From<Layer> for u8 {
    fn from(layer: Layer) -> Self {
        layer as Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_byte() {
        assert_eq!(Opcode::from_byte(0), Some(Opcode::Error));
        assert_eq!(Opcode::from_byte(3), Some(Opcode::Set));
        assert_eq!(Opcode::from_byte(7), Some(Opcode::Ok));
        assert_eq!(Opcode::from_byte(8), None);
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn test_opcode_values_match_wire() {
        assert_eq!(u8::from(Opcode::Init), 1);
        assert_eq!(u8::from(Opcode::Remote), 6);
        assert_eq!(Opcode::Reset.to_string(), "RESET");
    }

    #[test]
    fn test_layer_from_byte() {
        assert_eq!(Layer::from_byte(0), Some(Layer::Buttons));
        assert_eq!(Layer::from_byte(9), Some(Layer::Axis9));
        assert_eq!(Layer::from_byte(10), None);
    }
}
