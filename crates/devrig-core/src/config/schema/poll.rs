use super::{ConfigSchemaError, Validate, validate_nonzero};
use serde::{Deserialize, Serialize};
use std::time::Duration;

///
/// Defaults
///

mod defaults {
    pub const fn interval_ms() -> u64 {
        1_000
    }

    pub const fn boot_attempts() -> u32 {
        45
    }

    pub const fn boot_interval_ms() -> u64 {
        10_000
    }
}

///
/// PollConfig
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,
}

impl PollConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::interval_ms(),
        }
    }
}

impl Validate for PollConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_nonzero(self.interval_ms, "poll.interval_ms")
    }
}

///
/// BootConfig
/// How long to wait for `sys.boot_completed` after a reboot.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BootConfig {
    #[serde(default = "defaults::boot_attempts")]
    pub attempts: u32,

    #[serde(default = "defaults::boot_interval_ms")]
    pub interval_ms: u64,
}

impl BootConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            attempts: defaults::boot_attempts(),
            interval_ms: defaults::boot_interval_ms(),
        }
    }
}

impl Validate for BootConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_nonzero(u64::from(self.attempts), "boot.attempts")
    }
}
