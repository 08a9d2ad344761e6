use super::Device;
use crate::{Error, ids::UserId, log::Topic, poll, shell::quote};
use std::time::Duration;

/// PIN tests set on secure lock screens and expect to clear again.
pub const DEFAULT_PIN: &str = "1234";

const LOCK_RETRIES: u32 = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(500);

impl Device {
    pub fn set_pin(&self, user: UserId, pin: &str) -> Result<(), Error> {
        self.execute(&format!("locksettings set-pin --user {user} {}", quote(pin)))?;
        crate::log!(Topic::Lock, Info, "set PIN for user {user}");

        Ok(())
    }

    pub fn clear_credential(&self, user: UserId, old: &str) -> Result<(), Error> {
        self.execute(&format!("locksettings clear --old {} --user {user}", quote(old)))?;
        crate::log!(Topic::Lock, Info, "cleared credential for user {user}");

        Ok(())
    }

    /// `locksettings get-disabled`; anything but `true` or `false` is an error.
    pub fn is_lock_screen_disabled(&self, user: UserId, old: &str) -> Result<bool, Error> {
        let command = format!("locksettings get-disabled --old {} --user {user}", quote(old));

        match self.stdout(&command)?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(super::DeviceOpsError::UnexpectedOutput {
                command,
                output: other.to_string(),
            }
            .into()),
        }
    }

    /// Switch to the first user and remove `pin` from every user that has it.
    ///
    /// Per-user failures are logged and skipped.
    pub fn normalize_lock_screens(&self, pin: &str) -> Result<(), Error> {
        let users = self.list_user_ids()?;
        if let Some(first) = users.first() {
            self.switch_user(*first)?;
        }

        for user in users {
            match self.is_lock_screen_disabled(user, pin) {
                Ok(false) => {
                    if let Err(e) = self.clear_credential(user, pin) {
                        crate::log!(Topic::Lock, Warn, "couldn't unset PIN for user {user}: {e}");
                    }
                }
                Ok(true) => {}
                Err(e) => {
                    crate::log!(Topic::Lock, Warn, "couldn't check PIN for user {user}: {e}");
                }
            }
        }

        Ok(())
    }

    /// Run `attempt` until it reports the lock screen is showing, at most
    /// four times with a short pause between tries.
    pub fn lock_with_retry<F>(&self, mut attempt: F) -> Result<(), Error>
    where
        F: FnMut(&Self) -> Result<bool, Error>,
    {
        poll::retry("summon lock screen", LOCK_RETRIES, LOCK_RETRY_DELAY, |n| {
            if n > 0 {
                crate::log!(Topic::Lock, Info, "retrying to summon lock screen");
            }
            if attempt(self)? {
                Ok(())
            } else {
                Err(Error::assertion("Device could not be locked"))
            }
        })
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

    #[test]
    fn normalize_clears_only_users_with_pin() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply(
                    "pm list users",
                    "Users:\n\tUserInfo{0:Owner:c13} running\n\tUserInfo{10:Sec:0}\n",
                )
                .reply("am get-current-user", "0")
                .reply("locksettings get-disabled --old 1234 --user 0", "true")
                .reply("locksettings get-disabled --old 1234 --user 10", "false\n"),
        );

        device(&shell).normalize_lock_screens(DEFAULT_PIN).unwrap();

        assert_eq!(shell.count("locksettings clear"), 1);
        assert_eq!(shell.count("locksettings clear --old 1234 --user 10"), 1);
        assert_eq!(shell.count("am switch-user 0"), 1);
    }

    #[test]
    fn lock_retry_gives_up_after_four_attempts() {
        let shell = Arc::new(ScriptShell::new());
        let mut calls = 0;

        let err = device(&shell)
            .lock_with_retry(|_| {
                calls += 1;
                Ok(false)
            })
            .unwrap_err();

        assert_eq!(calls, 4);
        assert_eq!(err.message, "Device could not be locked");
    }

    #[test]
    fn unexpected_get_disabled_output_is_an_error() {
        let shell = Arc::new(ScriptShell::new().reply("locksettings get-disabled", "Old password '1234' didn't match"));

        assert!(device(&shell).is_lock_screen_disabled(UserId(0), DEFAULT_PIN).is_err());
    }
}
