use super::{ConfigSchemaError, Validate, validate_nonzero};
use serde::{Deserialize, Serialize};
use std::time::Duration;

///
/// Defaults
///

mod defaults {
    pub const fn shell_command_ms() -> u64 {
        120_000
    }

    pub const fn readiness_ms() -> u64 {
        10_000
    }

    pub const fn result_ms() -> u64 {
        20_000
    }

    pub const fn shutdown_ms() -> u64 {
        30_000
    }

    pub const fn online_ms() -> u64 {
        120_000
    }

    pub const fn user_switch_ms() -> u64 {
        10_000
    }

    pub const fn user_switch_settle_ms() -> u64 {
        10_000
    }

    pub const fn lskf_capture_ms() -> u64 {
        10_000
    }

    pub const fn instrumentation_ms() -> u64 {
        30 * 60 * 1_000
    }
}

///
/// TimeoutConfig
/// Every blocking wait in the harness, in milliseconds.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    #[serde(default = "defaults::shell_command_ms")]
    pub shell_command_ms: u64,

    #[serde(default = "defaults::readiness_ms")]
    pub readiness_ms: u64,

    #[serde(default = "defaults::result_ms")]
    pub result_ms: u64,

    #[serde(default = "defaults::shutdown_ms")]
    pub shutdown_ms: u64,

    #[serde(default = "defaults::online_ms")]
    pub online_ms: u64,

    #[serde(default = "defaults::user_switch_ms")]
    pub user_switch_ms: u64,

    // extra settle time after a user switch has been observed, may be zero
    #[serde(default = "defaults::user_switch_settle_ms")]
    pub user_switch_settle_ms: u64,

    #[serde(default = "defaults::lskf_capture_ms")]
    pub lskf_capture_ms: u64,

    // a whole `am instrument -w` run, which outlives any single shell command
    #[serde(default = "defaults::instrumentation_ms")]
    pub instrumentation_ms: u64,
}

impl TimeoutConfig {
    #[must_use]
    pub const fn shell_command(&self) -> Duration {
        Duration::from_millis(self.shell_command_ms)
    }

    #[must_use]
    pub const fn readiness(&self) -> Duration {
        Duration::from_millis(self.readiness_ms)
    }

    #[must_use]
    pub const fn result(&self) -> Duration {
        Duration::from_millis(self.result_ms)
    }

    #[must_use]
    pub const fn shutdown(&self) -> Duration {
        Duration::from_millis(self.shutdown_ms)
    }

    #[must_use]
    pub const fn online(&self) -> Duration {
        Duration::from_millis(self.online_ms)
    }

    #[must_use]
    pub const fn user_switch(&self) -> Duration {
        Duration::from_millis(self.user_switch_ms)
    }

    #[must_use]
    pub const fn user_switch_settle(&self) -> Duration {
        Duration::from_millis(self.user_switch_settle_ms)
    }

    #[must_use]
    pub const fn lskf_capture(&self) -> Duration {
        Duration::from_millis(self.lskf_capture_ms)
    }

    #[must_use]
    pub const fn instrumentation(&self) -> Duration {
        Duration::from_millis(self.instrumentation_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shell_command_ms: defaults::shell_command_ms(),
            readiness_ms: defaults::readiness_ms(),
            result_ms: defaults::result_ms(),
            shutdown_ms: defaults::shutdown_ms(),
            online_ms: defaults::online_ms(),
            user_switch_ms: defaults::user_switch_ms(),
            user_switch_settle_ms: defaults::user_switch_settle_ms(),
            lskf_capture_ms: defaults::lskf_capture_ms(),
            instrumentation_ms: defaults::instrumentation_ms(),
        }
    }
}

impl Validate for TimeoutConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_nonzero(self.shell_command_ms, "timeouts.shell_command_ms")?;
        validate_nonzero(self.readiness_ms, "timeouts.readiness_ms")?;
        validate_nonzero(self.result_ms, "timeouts.result_ms")?;
        validate_nonzero(self.shutdown_ms, "timeouts.shutdown_ms")?;
        validate_nonzero(self.online_ms, "timeouts.online_ms")?;
        validate_nonzero(self.user_switch_ms, "timeouts.user_switch_ms")?;
        validate_nonzero(self.lskf_capture_ms, "timeouts.lskf_capture_ms")?;
        validate_nonzero(self.instrumentation_ms, "timeouts.instrumentation_ms")?;

        Ok(())
    }
}
