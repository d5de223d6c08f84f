//! Runtime device configuration.
//!
//! One configuration value replaces the per-device compile-time constants
//! (UUID, type string, battery curve, retry count, channel).

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::frame::MAX_DEVICE_PAYLOAD;
use crate::types::identity::{DEFAULT_CHANNEL, HUB_ADDRESS};
use crate::types::uuid::Uuid;

/// Default number of send attempts.
pub const DEFAULT_SEND_RETRIES: u8 = 1;

/// Voltage window of a battery, used to derive the power indicator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryCurve {
    /// Voltage reported as the lowest level, in millivolts.
    pub empty_mv: u16,
    /// Voltage reported as the highest level, in millivolts.
    pub full_mv: u16,
}

impl BatteryCurve {
    /// Creates a new battery curve.
    #[must_use]
    pub const fn new(empty_mv: u16, full_mv: u16) -> Self {
        Self { empty_mv, full_mv }
    }

    /// Maps a supply voltage onto `1..=255`, clamping to the curve.
    #[must_use]
    pub fn level(&self, millivolts: u16) -> u8 {
        if self.full_mv <= self.empty_mv {
            return u8::MAX;
        }
        let mv = u32::from(millivolts.clamp(self.empty_mv, self.full_mv));
        let span = u32::from(self.full_mv - self.empty_mv);
        let level = (mv - u32::from(self.empty_mv)) * 254 / span + 1;
        u8::try_from(level).unwrap_or(u8::MAX)
    }
}

impl Default for BatteryCurve {
    fn default() -> Self {
        Self::new(2200, 3000)
    }
}

/// How a device is powered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PowerClass {
    /// Permanently powered; power indicator byte is 0.
    #[default]
    Mains,
    /// Battery powered; power indicator byte is the battery level.
    Battery(BatteryCurve),
}

impl PowerClass {
    /// Returns the power indicator byte for a frame header.
    ///
    /// Battery devices without a voltage reading report the lowest level.
    #[must_use]
    pub fn indicator(&self, millivolts: Option<u16>) -> u8 {
        match self {
            Self::Mains => 0,
            Self::Battery(curve) => millivolts.map_or(1, |mv| curve.level(mv)),
        }
    }
}

/// Fixed protocol time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait after an unacknowledged INIT before sending it again.
    pub pairing_backoff: Duration,
    /// How long to wait for the hub's pairing reply.
    pub response_window: Duration,
    /// How often the radio is checked inside the response window.
    pub response_poll: Duration,
    /// Delay between send attempts.
    pub retry_delay: Duration,
    /// Pause after a reset before the loop resumes.
    pub reset_pause: Duration,
    /// Idle time between two receive polls of the run loop.
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pairing_backoff: Duration::from_secs(3),
            response_window: Duration::from_secs(2),
            response_poll: Duration::from_millis(500),
            retry_delay: Duration::from_millis(200),
            reset_pause: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Configuration of a single peripheral device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Factory UUID.
    pub uuid: Uuid,
    /// Human-readable type string sent with INIT (at most 20 bytes).
    pub device_type: String,
    /// Firmware version byte.
    pub firmware_version: u8,
    /// Power class.
    pub power: PowerClass,
    /// Unsolicited status interval in seconds, 0 disables it.
    pub status_interval: u8,
    /// Radio channel.
    pub channel: u8,
    /// Address of the hub.
    pub hub_address: u8,
    /// Send attempts per frame (at least 1).
    pub send_retries: u8,
    /// Accept peer remote-control frames.
    pub allow_remote: bool,
    /// Keep a copy of the control state in storage across power loss.
    pub persist_state: bool,
    /// Protocol time windows.
    pub timings: Timings,
}

impl DeviceConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new(uuid: Uuid, device_type: impl Into<String>) -> Self {
        Self {
            uuid,
            device_type: device_type.into(),
            firmware_version: 1,
            power: PowerClass::Mains,
            status_interval: 0,
            channel: DEFAULT_CHANNEL,
            hub_address: HUB_ADDRESS,
            send_retries: DEFAULT_SEND_RETRIES,
            allow_remote: false,
            persist_state: false,
            timings: Timings::default(),
        }
    }

    /// Sets the firmware version.
    #[must_use]
    pub const fn firmware_version(mut self, version: u8) -> Self {
        self.firmware_version = version;
        self
    }

    /// Sets the power class.
    #[must_use]
    pub const fn power(mut self, power: PowerClass) -> Self {
        self.power = power;
        self
    }

    /// Sets the status interval in seconds.
    #[must_use]
    pub const fn status_interval(mut self, seconds: u8) -> Self {
        self.status_interval = seconds;
        self
    }

    /// Sets the radio channel.
    #[must_use]
    pub const fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Sets the number of send attempts.
    #[must_use]
    pub const fn send_retries(mut self, retries: u8) -> Self {
        self.send_retries = retries;
        self
    }

    /// Enables peer remote-control frames.
    #[must_use]
    pub const fn allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Enables persisting the control state after every applied setting.
    #[must_use]
    pub const fn persist_state(mut self, persist: bool) -> Self {
        self.persist_state = persist;
        self
    }

    /// Replaces the protocol time windows.
    #[must_use]
    pub const fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Checks the configuration against protocol limits.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the type string does not fit an INIT payload
    /// or no send attempt is allowed.
    pub fn validate(&self) -> Result<()> {
        if self.device_type.len() > MAX_DEVICE_PAYLOAD {
            return Err(Error::Config {
                reason: format!(
                    "device type is {} bytes, maximum is {MAX_DEVICE_PAYLOAD}",
                    self.device_type.len()
                ),
            });
        }
        if self.send_retries == 0 {
            return Err(Error::Config {
                reason: "send_retries must be at least 1".into(),
            });
        }
        Ok(())
    }
}
