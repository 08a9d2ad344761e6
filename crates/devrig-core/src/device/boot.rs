use super::Device;
use crate::{Error, log::Topic, poll};

/// Failure label for the boot wait.
pub const BOOT_FAILURE: &str = "System failed to become ready!";

impl Device {
    pub fn is_boot_completed(&self) -> Result<bool, Error> {
        Ok(self.getprop("sys.boot_completed")?.as_deref() == Some("1"))
    }

    /// Poll `sys.boot_completed` per the `[boot]` config section.
    ///
    /// `boot.attempts` counts checks, not sleeps: the defaults make 45 checks
    /// 10 seconds apart, so the wait gives up after 44 sleeps (about 7.3
    /// minutes) with no sleep after the last check.
    pub fn wait_for_boot_completed(&self) -> Result<(), Error> {
        let boot = &self.config().boot;
        crate::log!(Topic::Boot, Info, "waiting for {} to finish booting", self.describe());

        poll::poll_attempts(BOOT_FAILURE, boot.attempts, boot.interval(), || {
            match self.is_boot_completed() {
                // the device may still be coming up on the transport
                Err(e) if e.is_device_unavailable() => Ok(false),
                other => other,
            }
        })?;
        crate::log!(Topic::Boot, Ok, "{} booted", self.describe());

        Ok(())
    }

    /// Wait for the device to drop off, come back, and finish booting.
    pub fn wait_for_reconnect(&self) -> Result<(), Error> {
        let timeouts = &self.config().timeouts;

        self.shell().wait_for_not_available(timeouts.shutdown())?;
        self.shell().wait_for_online(timeouts.online())?;

        self.wait_for_boot_completed()
    }

    /// `reboot`, then wait for the device to come back.
    pub fn reboot(&self) -> Result<(), Error> {
        crate::log!(Topic::Boot, Info, "rebooting {}", self.describe());
        // the connection usually drops before adb reports anything
        match self.execute("reboot") {
            Err(e) if !e.is_device_unavailable() => return Err(e),
            _ => {}
        }

        self.wait_for_reconnect()
    }
}

///
/// TESTS
///
