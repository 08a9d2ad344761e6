use super::Device;
use crate::{Error, ids::ComponentName, log::Topic, poll};

impl Device {
    pub fn enable_ime(&self, ime: &ComponentName) -> Result<(), Error> {
        self.execute(&format!("ime enable {}", ime.flatten_short()))?;
        crate::log!(Topic::Device, Info, "enabled IME {ime}");

        Ok(())
    }

    pub fn disable_ime(&self, ime: &ComponentName) -> Result<(), Error> {
        self.execute(&format!("ime disable {}", ime.flatten_short()))?;

        Ok(())
    }

    /// Enabled input methods from `ime list -s`.
    pub fn enabled_imes(&self) -> Result<Vec<ComponentName>, Error> {
        let out = self.execute("ime list -s")?;

        Ok(out
            .stdout
            .lines()
            .filter_map(|l| ComponentName::parse(l).ok())
            .collect())
    }

    pub fn wait_for_ime_enabled(&self, ime: &ComponentName) -> Result<(), Error> {
        let label = format!("IME {} was not enabled", ime.flatten_short());

        poll::wait_until(
            &label,
            self.config().timeouts.readiness(),
            self.config().poll.interval(),
            || Ok::<_, Error>(self.enabled_imes()?.contains(ime)),
        )
    }
}

///
/// TESTS
///
