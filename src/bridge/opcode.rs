//! Serial bridge opcodes.

/// Message types exchanged between host and adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BridgeOpcode {
    /// Radio payload: host→adapter send request or adapter→host received frame.
    Msg = 0,
    /// Reserved for acknowledgement payloads.
    Payload = 1,
    /// Adapter announcement or host radio-init request.
    Init = 2,
    /// Failure report.
    Error = 3,
    /// Success report.
    Ok = 4,
    /// Informational text.
    Info = 5,
    /// Restart request (host) or restart acknowledgement (adapter).
    Reboot = 6,
    /// Adapter setting change.
    Setting = 7,
}

impl BridgeOpcode {
    /// All opcodes in wire order.
    pub const ALL: [Self; 8] = [
        Self::Msg,
        Self::Payload,
        Self::Init,
        Self::Error,
        Self::Ok,
        Self::Info,
        Self::Reboot,
        Self::Setting,
    ];

    /// Attempts to parse an opcode from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Msg),
            1 => Some(Self::Payload),
            2 => Some(Self::Init),
            3 => Some(Self::Error),
            4 => Some(Self::Ok),
            5 => Some(Self::Info),
            6 => Some(Self::Reboot),
            7 => Some(Self::Setting),
            _ => None,
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the clear-text name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Msg => "MSG",
            Self::Payload => "PAYLOAD",
            Self::Init => "INIT",
            Self::Error => "ERROR",
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Reboot => "REBOOT",
            Self::Setting => "SETTING",
        }
    }

    /// Looks up an opcode by its clear-text name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl From<BridgeOpcode> for u8 {
    fn from(op: BridgeOpcode) -> Self {
        op as Self
    }
}

impl std::fmt::Display for BridgeOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
