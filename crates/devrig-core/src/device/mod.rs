//! Typed operations over the device shell surface.
//!
//! `Device` is a cheap, cloneable handle. Operations are grouped by the
//! service they talk to; state-changing ones come with an RAII guard that puts
//! the previous value back.

mod activity;
mod boot;
mod device_config;
mod fixture;
mod ime;
mod lock;
mod packages;
mod props;
mod recovery;
mod settings;
mod users;

pub use boot::BOOT_FAILURE;
pub use device_config::{DeviceConfigGuard, SyncDisabledMode};
pub use fixture::DeviceFixture;
pub use lock::DEFAULT_PIN;
pub use packages::{PackageGuard, SuspendGuard};
pub use recovery::{LskfGuard, REBOOT_REASON};
pub use settings::{SettingGuard, SettingsNamespace};
pub use users::UserInfo;

use crate::{
    Error, ThisError,
    config::ConfigModel,
    install::InstallMultiple,
    shell::{self, ShellExecutor, ShellOutput},
};
use std::sync::Arc;

///
/// DeviceOpsError
///

#[derive(Debug, ThisError)]
pub enum DeviceOpsError {
    #[error("cannot parse {what} from: {output}")]
    Parse { what: &'static str, output: String },

    #[error("reboot-and-apply failed: {0}")]
    RebootApplyFailed(String),

    #[error("'{command}' returned unexpected output: {output}")]
    UnexpectedOutput { command: String, output: String },
}

impl From<DeviceOpsError> for Error {
    fn from(err: DeviceOpsError) -> Self {
        match err {
            DeviceOpsError::Parse { .. } => Self::shell(err.to_string()),
            _ => Self::assertion(err.to_string()),
        }
    }
}

///
/// Device
///

#[derive(Clone)]
pub struct Device {
    shell: Arc<dyn ShellExecutor>,
    config: Arc<ConfigModel>,
}

impl Device {
    pub fn new(shell: Arc<dyn ShellExecutor>, config: Arc<ConfigModel>) -> Self {
        Self { shell, config }
    }

    #[must_use]
    pub const fn shell(&self) -> &Arc<dyn ShellExecutor> {
        &self.shell
    }

    #[must_use]
    pub fn config(&self) -> &ConfigModel {
        &self.config
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.shell.describe()
    }

    /// Run a raw command; output is returned whatever it says.
    pub fn execute(&self, command: &str) -> Result<ShellOutput, Error> {
        Ok(shell::run(&*self.shell, command)?)
    }

    /// Run a command whose output must start with `Success`.
    pub fn execute_expect_success(&self, command: &str) -> Result<ShellOutput, Error> {
        Ok(shell::run_expect_success(&*self.shell, command)?)
    }

    /// Trimmed stdout of `command`.
    pub fn stdout(&self, command: &str) -> Result<String, Error> {
        Ok(self.execute(command)?.trimmed().to_string())
    }

    /// Run `command` and require `needle` somewhere in its output.
    pub(crate) fn execute_expect_contains(
        &self,
        command: &str,
        needle: &str,
    ) -> Result<ShellOutput, Error> {
        let output = self.execute(command)?;
        if !output.contains(needle) {
            return Err(DeviceOpsError::UnexpectedOutput {
                command: command.to_string(),
                output: output.combined(),
            }
            .into());
        }

        Ok(output)
    }

    /// Start a multi-file session install staged through this device.
    #[must_use]
    pub fn install_multiple(&self) -> InstallMultiple {
        InstallMultiple::new(self.shell.clone(), self.config.device.staging_dir.clone())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("shell", &self.shell.describe())
            .finish_non_exhaustive()
    }
}
