use super::{ConfigSchemaError, Validate};
use serde::{Deserialize, Serialize};

///
/// Defaults
///

mod defaults {
    pub fn adb() -> String {
        "adb".to_string()
    }

    pub fn staging_dir() -> String {
        "/data/local/tmp".to_string()
    }

    pub fn instrumentation_runner() -> String {
        "androidx.test.runner.AndroidJUnitRunner".to_string()
    }

    pub fn command_receiver() -> String {
        ".CommandReceiver".to_string()
    }
}

///
/// DeviceConfig
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    // none lets adb pick the only attached device
    #[serde(default)]
    pub serial: Option<String>,

    #[serde(default = "defaults::adb")]
    pub adb: String,

    // where APKs are pushed before install-write
    #[serde(default = "defaults::staging_dir")]
    pub staging_dir: String,

    #[serde(default = "defaults::instrumentation_runner")]
    pub instrumentation_runner: String,

    // receiver class inside each companion app, `.Name` is package-relative
    #[serde(default = "defaults::command_receiver")]
    pub command_receiver: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            adb: defaults::adb(),
            staging_dir: defaults::staging_dir(),
            instrumentation_runner: defaults::instrumentation_runner(),
            command_receiver: defaults::command_receiver(),
        }
    }
}

impl Validate for DeviceConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if self.serial.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigSchemaError::ValidationError(
                "device.serial must not be empty when set".to_string(),
            ));
        }

        if self.adb.trim().is_empty() {
            return Err(ConfigSchemaError::ValidationError(
                "device.adb must not be empty".to_string(),
            ));
        }

        if !self.staging_dir.starts_with('/') {
            return Err(ConfigSchemaError::ValidationError(format!(
                "device.staging_dir '{}' must be an absolute device path",
                self.staging_dir
            )));
        }

        if self.instrumentation_runner.trim().is_empty() {
            return Err(ConfigSchemaError::ValidationError(
                "device.instrumentation_runner must not be empty".to_string(),
            ));
        }

        if self.command_receiver.trim().is_empty() {
            return Err(ConfigSchemaError::ValidationError(
                "device.command_receiver must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
