use super::{Device, DeviceOpsError};
use crate::{Error, log::Topic, shell::quote};
use derive_more::Display;

///
/// SyncDisabledMode
/// Whether server-pushed flag updates may overwrite locally set values.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SyncDisabledMode {
    #[display("none")]
    None,

    #[display("persistent")]
    Persistent,

    #[display("until_reboot")]
    UntilReboot,
}

impl Device {
    pub fn device_config_get(&self, namespace: &str, key: &str) -> Result<Option<String>, Error> {
        let value = self.stdout(&format!(
            "device_config get {} {}",
            quote(namespace),
            quote(key)
        ))?;

        Ok((value != "null" && !value.is_empty()).then_some(value))
    }

    pub fn device_config_put(&self, namespace: &str, key: &str, value: &str) -> Result<(), Error> {
        self.execute(&format!(
            "device_config put {} {} {}",
            quote(namespace),
            quote(key),
            quote(value)
        ))?;
        crate::log!(Topic::Settings, Info, "device_config {namespace}/{key} = {value}");

        Ok(())
    }

    pub fn device_config_delete(&self, namespace: &str, key: &str) -> Result<(), Error> {
        self.execute(&format!(
            "device_config delete {} {}",
            quote(namespace),
            quote(key)
        ))?;

        Ok(())
    }

    /// Put a flag and read it back; a mismatch is an assertion failure.
    pub fn device_config_put_verified(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.device_config_put(namespace, key, value)?;

        let actual = self.device_config_get(namespace, key)?;
        if actual.as_deref() != Some(value) {
            return Err(DeviceOpsError::UnexpectedOutput {
                command: format!("device_config get {namespace} {key}"),
                output: actual.unwrap_or_else(|| "null".to_string()),
            }
            .into());
        }

        Ok(())
    }

    /// Override a flag until the returned guard is dropped.
    pub fn override_device_config(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<DeviceConfigGuard, Error> {
        let previous = self.device_config_get(namespace, key)?;
        self.device_config_put_verified(namespace, key, value)?;

        Ok(DeviceConfigGuard {
            device: self.clone(),
            namespace: namespace.to_string(),
            key: key.to_string(),
            previous,
        })
    }

    pub fn set_sync_disabled_for_tests(&self, mode: SyncDisabledMode) -> Result<(), Error> {
        self.execute(&format!("device_config set_sync_disabled_for_tests {mode}"))?;

        // older builds ignore the command; the caller decides if that matters
        let current = self.stdout("device_config get_sync_disabled_for_tests")?;
        if !current.contains(&mode.to_string()) {
            crate::log!(Topic::Settings, Warn, "sync mode is '{current}', wanted '{mode}'");
        }

        Ok(())
    }
}

///
/// DeviceConfigGuard
///

pub struct DeviceConfigGuard {
    device: Device,
    namespace: String,
    key: String,
    previous: Option<String>,
}

impl Drop for DeviceConfigGuard {
    fn drop(&mut self) {
        let result = match &self.previous {
            Some(value) => self
                .device
                .device_config_put(&self.namespace, &self.key, value),
            None => self.device.device_config_delete(&self.namespace, &self.key),
        };

        if let Err(e) = result {
            crate::log!(
                Topic::Settings,
                Warn,
                "failed to restore device_config {}/{}: {e}",
                self.namespace,
                self.key
            );
        }
    }
}

///
/// TESTS
///
