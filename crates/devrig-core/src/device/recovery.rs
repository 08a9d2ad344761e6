use super::{Device, DeviceOpsError};
use crate::{Error, ids::PackageName, log::Topic, poll};

/// Reason passed to `reboot-and-apply`.
pub const REBOOT_REASON: &str = "cts-test";

const CAPTURE_STATUS: &str = "LSKF capture status: ";
const APPLY_FAILURE: &str = "Reboot and apply status: failure";

impl Device {
    /// `cmd recovery request-lskf <client>`.
    pub fn request_lskf(&self, client: &PackageName) -> Result<(), Error> {
        self.execute_expect_contains(&format!("cmd recovery request-lskf {client}"), "success")?;
        crate::log!(Topic::Recovery, Info, "requested LSKF for {client}");

        Ok(())
    }

    /// `cmd recovery clear-lskf <client>`.
    pub fn clear_lskf(&self, client: &PackageName) -> Result<(), Error> {
        self.execute_expect_contains(&format!("cmd recovery clear-lskf {client}"), "success")?;
        crate::log!(Topic::Recovery, Info, "cleared LSKF for {client}");

        Ok(())
    }

    /// Request LSKF for `client` and clear it again when the guard drops.
    pub fn hold_lskf(&self, client: &PackageName) -> Result<LskfGuard, Error> {
        self.request_lskf(client)?;

        Ok(LskfGuard {
            device: self.clone(),
            client: client.clone(),
        })
    }

    /// Builds without `is-lskf-captured` print no status line; that counts as captured.
    pub fn is_lskf_captured(&self, client: &PackageName) -> Result<bool, Error> {
        let out = self.execute(&format!("cmd recovery is-lskf-captured {client}"))?;

        let status = out
            .stdout
            .lines()
            .find_map(|l| l.split_once(CAPTURE_STATUS).map(|(_, s)| s.trim()));
        match status {
            Some(word) => Ok(word
                .split(|c: char| !c.is_alphanumeric())
                .next()
                .is_some_and(|w| w.eq_ignore_ascii_case("true"))),
            None => {
                crate::log!(Topic::Recovery, Info, "is-lskf-captured not implemented, assuming captured");
                Ok(true)
            }
        }
    }

    pub fn wait_for_lskf_captured(&self, client: &PackageName) -> Result<(), Error> {
        let timeout = self.config().timeouts.lskf_capture();
        let label = format!(
            "Lskf isn't captured after {} seconds for {client}",
            timeout.as_secs()
        );

        poll::wait_until(&label, timeout, self.config().poll.interval(), || {
            self.is_lskf_captured(client)
        })
    }

    /// Verify capture, reboot through recovery, wait for the device to return.
    pub fn reboot_and_apply(&self, client: &PackageName) -> Result<(), Error> {
        self.wait_for_lskf_captured(client)?;

        crate::log!(Topic::Recovery, Info, "reboot-and-apply for {client}");
        let command = format!("cmd recovery reboot-and-apply {client} {REBOOT_REASON}");
        match self.execute(&command) {
            Ok(out) if out.contains(APPLY_FAILURE) => {
                return Err(DeviceOpsError::RebootApplyFailed(out.combined()).into());
            }
            // the reboot may cut the connection before output arrives
            Err(e) if !e.is_device_unavailable() => return Err(e),
            _ => {}
        }

        self.wait_for_reconnect()
    }

    /// `cmd lock_settings set-resume-on-reboot-provider-package`; `None` resets it.
    pub fn set_resume_on_reboot_provider(&self, package: Option<&PackageName>) -> Result<(), Error> {
        let package = package.map(PackageName::as_str).unwrap_or_default();
        self.execute(&format!(
            "cmd lock_settings set-resume-on-reboot-provider-package {package}"
        ))?;

        Ok(())
    }
}

///
/// LskfGuard
///

pub struct LskfGuard {
    device: Device,
    client: PackageName,
}

impl Drop for LskfGuard {
    fn drop(&mut self) {
        if let Err(e) = self.device.clear_lskf(&self.client) {
            crate::log!(Topic::Recovery, Warn, "failed to clear LSKF for {}: {e}", self.client);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{ScriptShell, device};
    use std::sync::Arc;

    fn client() -> PackageName {
        PackageName::new("com.android.cts.encryptionapp").unwrap()
    }

    #[test]
    fn request_requires_success_word() {
        let shell = Arc::new(ScriptShell::new().reply("cmd recovery request-lskf", "Request LSKF status: failure"));

        let err = device(&shell).request_lskf(&client()).unwrap_err();
        assert!(err.message.contains("request-lskf"));
    }

    #[test]
    fn capture_status_parsing() {
        let shell = Arc::new(ScriptShell::new().sequence(
            "cmd recovery is-lskf-captured",
            &["LSKF capture status: false", "LSKF capture status: TRUE\n", "Unknown command"],
        ));
        let dev = device(&shell);

        assert!(!dev.is_lskf_captured(&client()).unwrap());
        assert!(dev.is_lskf_captured(&client()).unwrap());
        assert!(dev.is_lskf_captured(&client()).unwrap());
    }

    #[test]
    fn reboot_and_apply_fails_on_status_line() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("cmd recovery is-lskf-captured", "LSKF capture status: true")
                .reply(
                    "cmd recovery reboot-and-apply",
                    "Reboot and apply status: failure",
                ),
        );

        let err = device(&shell).reboot_and_apply(&client()).unwrap_err();
        assert!(err.message.contains("reboot-and-apply failed"));
    }

    #[test]
    fn reboot_and_apply_waits_for_boot() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("cmd recovery is-lskf-captured", "LSKF capture status: true")
                .reply("cmd recovery reboot-and-apply", "")
                .reply("getprop sys.boot_completed", "1"),
        );

        device(&shell).reboot_and_apply(&client()).unwrap();
        assert_eq!(
            shell.history(),
            vec![
                "cmd recovery is-lskf-captured com.android.cts.encryptionapp",
                "cmd recovery reboot-and-apply com.android.cts.encryptionapp cts-test",
                "getprop sys.boot_completed",
            ]
        );
    }

    #[test]
    fn lskf_guard_clears_on_drop() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("cmd recovery request-lskf", "success")
                .reply("cmd recovery clear-lskf", "success"),
        );
        drop(device(&shell).hold_lskf(&client()).unwrap());

        assert_eq!(shell.count("cmd recovery clear-lskf com.android.cts.encryptionapp"), 1);
    }

    #[test]
    fn uncaptured_lskf_times_out() {
        let shell = Arc::new(ScriptShell::new().reply("cmd recovery is-lskf-captured", "LSKF capture status: false"));

        let err = device(&shell).wait_for_lskf_captured(&client()).unwrap_err();
        assert!(err.is_timeout());
        assert!(err.message.starts_with("Lskf isn't captured"));
    }
}
