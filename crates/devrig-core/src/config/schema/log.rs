use super::{ConfigSchemaError, Validate};
use crate::log::Level;
use serde::{Deserialize, Serialize};

///
/// Defaults
///

mod defaults {
    use crate::log::Level;

    pub const fn level() -> Level {
        Level::Info
    }

    pub const fn max_entries() -> usize {
        1_000
    }
}

pub const MAX_LOG_ENTRIES: usize = 100_000;

///
/// LogConfig
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
#[allow(clippy::struct_field_names)]
pub struct LogConfig {
    // lines below this level are retained but not printed
    #[serde(default = "defaults::level")]
    pub level: Level,

    #[serde(default = "defaults::max_entries")]
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: defaults::level(),
            max_entries: defaults::max_entries(),
        }
    }
}

impl Validate for LogConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if self.max_entries > MAX_LOG_ENTRIES {
            return Err(ConfigSchemaError::ValidationError(format!(
                "log.max_entries {} exceeds max {}",
                self.max_entries, MAX_LOG_ENTRIES
            )));
        }

        Ok(())
    }
}
