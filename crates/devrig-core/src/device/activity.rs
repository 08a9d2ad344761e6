use super::Device;
use crate::{
    Error,
    ids::{ComponentName, PackageName, UserId},
    log::Topic,
};

impl Device {
    /// Launch `component` as a launcher would, which also takes its package
    /// out of the stopped state.
    pub fn start_launcher_activity(
        &self,
        user: UserId,
        component: &ComponentName,
    ) -> Result<(), Error> {
        let out = self.execute(&format!(
            "am start -a android.intent.action.MAIN --user {user} \
             -c android.intent.category.LAUNCHER {}",
            component.flatten_short()
        ))?;
        if out.stdout.contains("Error:") {
            return Err(super::DeviceOpsError::UnexpectedOutput {
                command: "am start".to_string(),
                output: out.combined(),
            }
            .into());
        }

        Ok(())
    }

    pub fn force_stop(&self, package: &PackageName) -> Result<(), Error> {
        self.execute(&format!("am force-stop {package}"))?;

        Ok(())
    }

    /// `svc power stayon`. A failure is logged, not returned.
    pub fn set_stay_on(&self, on: bool) -> Result<(), Error> {
        let out = self.execute(&format!("svc power stayon {on}"))?;
        if out.exit_code.is_some_and(|c| c != 0) {
            crate::log!(
                Topic::Device,
                Warn,
                "could not set screen stay-on: exit {:?}, {}",
                out.exit_code,
                out.stderr.trim()
            );
        }

        Ok(())
    }
}

///
/// TESTS
///
