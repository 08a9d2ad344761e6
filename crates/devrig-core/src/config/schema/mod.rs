mod device;
mod log;
mod poll;
mod timeouts;

pub use device::*;
pub use log::*;
pub use poll::*;
pub use timeouts::*;

use crate::{Error, ThisError, config::ConfigError};
use serde::{Deserialize, Serialize};

///
/// ConfigSchemaError
///

#[derive(Debug, ThisError)]
pub enum ConfigSchemaError {
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigSchemaError> for Error {
    fn from(err: ConfigSchemaError) -> Self {
        ConfigError::from(err).into()
    }
}

fn validate_nonzero(value: u64, context: &str) -> Result<(), ConfigSchemaError> {
    if value == 0 {
        return Err(ConfigSchemaError::ValidationError(format!(
            "{context} must be greater than zero"
        )));
    }

    Ok(())
}

///
/// Validate
///

pub trait Validate {
    fn validate(&self) -> Result<(), ConfigSchemaError>;
}

///
/// ConfigModel
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigModel {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub boot: BootConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Validate for ConfigModel {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        self.device.validate()?;
        self.timeouts.validate()?;
        self.poll.validate()?;
        self.boot.validate()?;
        self.log.validate()?;

        Ok(())
    }
}

///
/// TESTS
///
