use super::{Device, DeviceOpsError};
use crate::{Error, ids::UserId, log::Topic, shell::quote};
use derive_more::Display;

///
/// SettingsNamespace
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SettingsNamespace {
    #[display("global")]
    Global,

    #[display("secure")]
    Secure,

    #[display("system")]
    System,
}

impl Device {
    pub fn get_setting(&self, ns: SettingsNamespace, key: &str) -> Result<Option<String>, Error> {
        self.settings_get(None, ns, key)
    }

    pub fn get_setting_for_user(
        &self,
        user: UserId,
        ns: SettingsNamespace,
        key: &str,
    ) -> Result<Option<String>, Error> {
        self.settings_get(Some(user), ns, key)
    }

    pub fn put_setting(&self, ns: SettingsNamespace, key: &str, value: &str) -> Result<(), Error> {
        self.settings_put(None, ns, key, value)
    }

    pub fn put_setting_for_user(
        &self,
        user: UserId,
        ns: SettingsNamespace,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.settings_put(Some(user), ns, key, value)
    }

    pub fn delete_setting(&self, ns: SettingsNamespace, key: &str) -> Result<(), Error> {
        self.settings_delete(None, ns, key)
    }

    /// Set `key` to `value` until the returned guard is dropped.
    pub fn override_setting(
        &self,
        ns: SettingsNamespace,
        key: &str,
        value: &str,
    ) -> Result<SettingGuard, Error> {
        self.override_setting_for(None, ns, key, value)
    }

    pub fn override_setting_for_user(
        &self,
        user: UserId,
        ns: SettingsNamespace,
        key: &str,
        value: &str,
    ) -> Result<SettingGuard, Error> {
        self.override_setting_for(Some(user), ns, key, value)
    }

    fn override_setting_for(
        &self,
        user: Option<UserId>,
        ns: SettingsNamespace,
        key: &str,
        value: &str,
    ) -> Result<SettingGuard, Error> {
        let previous = self.settings_get(user, ns, key)?;
        self.settings_put(user, ns, key, value)?;

        Ok(SettingGuard {
            device: self.clone(),
            user,
            ns,
            key: key.to_string(),
            previous,
        })
    }

    fn settings_get(
        &self,
        user: Option<UserId>,
        ns: SettingsNamespace,
        key: &str,
    ) -> Result<Option<String>, Error> {
        let command = format!("settings get{} {ns} {}", user_flag(user), quote(key));
        let value = self.with_reconnect_retry(|| self.stdout(&command))?;

        Ok((value != "null").then_some(value))
    }

    fn settings_put(
        &self,
        user: Option<UserId>,
        ns: SettingsNamespace,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let command = format!(
            "settings put{} {ns} {} {}",
            user_flag(user),
            quote(key),
            quote(value)
        );
        // `settings put` is silent on success
        let output = self.with_reconnect_retry(|| self.execute(&command))?;
        let printed = output.combined();
        if !printed.is_empty() {
            crate::log!(Topic::Settings, Warn, "{ns} {key} not written: {printed}");
            return Err(DeviceOpsError::UnexpectedOutput {
                command,
                output: printed,
            }
            .into());
        }
        crate::log!(Topic::Settings, Info, "{ns} {key} = {value}");

        Ok(())
    }

    fn settings_delete(
        &self,
        user: Option<UserId>,
        ns: SettingsNamespace,
        key: &str,
    ) -> Result<(), Error> {
        let command = format!("settings delete{} {ns} {}", user_flag(user), quote(key));
        self.with_reconnect_retry(|| self.execute(&command))?;

        Ok(())
    }

    // one retry when the transport dropped mid-command
    fn with_reconnect_retry<T>(&self, op: impl Fn() -> Result<T, Error>) -> Result<T, Error> {
        match op() {
            Err(e) if e.is_device_unavailable() => {
                crate::log!(Topic::Settings, Warn, "device unavailable, retrying once: {e}");
                self.shell()
                    .wait_for_online(self.config().timeouts.online())?;
                op()
            }
            other => other,
        }
    }
}

fn user_flag(user: Option<UserId>) -> String {
    user.map(|u| format!(" --user {u}")).unwrap_or_default()
}

///
/// SettingGuard
/// Restores a setting's previous value, or deletes it if it was unset.
///

pub struct SettingGuard {
    device: Device,
    user: Option<UserId>,
    ns: SettingsNamespace,
    key: String,
    previous: Option<String>,
}

impl SettingGuard {
    #[must_use]
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }
}

impl Drop for SettingGuard {
    fn drop(&mut self) {
        let result = match &self.previous {
            Some(value) => self
                .device
                .settings_put(self.user, self.ns, &self.key, value),
            None => self.device.settings_delete(self.user, self.ns, &self.key),
        };

        if let Err(e) = result {
            crate::log!(Topic::Settings, Warn, "failed to restore {} {}: {e}", self.ns, self.key);
        }
    }
}

///
/// TESTS
///
