use super::{Device, DeviceOpsError};
use crate::{Error, ids::UserId, log::Topic, poll};
use std::{
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// UserInfo
/// One row of `pm list users`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
    pub flags: String,
    pub running: bool,
}

impl UserInfo {
    /// Parse `UserInfo{10:Work profile:1030} running`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix("UserInfo{")?;
        let (inner, tail) = rest.split_once('}')?;

        let (id, rest) = inner.split_once(':')?;
        let (name, flags) = rest.rsplit_once(':').unwrap_or((rest, ""));

        Some(Self {
            id: id.parse().ok()?,
            name: name.to_string(),
            flags: flags.to_string(),
            running: tail.trim() == "running",
        })
    }
}

impl Device {
    pub fn list_users(&self) -> Result<Vec<UserInfo>, Error> {
        let out = self.execute("pm list users")?;

        Ok(out.stdout.lines().filter_map(UserInfo::parse).collect())
    }

    pub fn list_user_ids(&self) -> Result<Vec<UserId>, Error> {
        Ok(self.list_users()?.into_iter().map(|u| u.id).collect())
    }

    pub fn current_user(&self) -> Result<UserId, Error> {
        let raw = self.stdout("am get-current-user")?;

        raw.parse().map_err(|_| {
            DeviceOpsError::Parse {
                what: "current user",
                output: raw,
            }
            .into()
        })
    }

    /// `pm create-user --profileOf <parent> --managed TestProfile_<millis>`.
    pub fn create_managed_profile(&self, parent: UserId) -> Result<UserId, Error> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let command = format!("pm create-user --profileOf {parent} --managed TestProfile_{millis}");

        let out = self.execute(&command)?;
        let id = parse_created_user(&out.stdout).ok_or_else(|| DeviceOpsError::UnexpectedOutput {
            command,
            output: out.combined(),
        })?;
        crate::log!(Topic::Users, Info, "created managed profile {id} for user {parent}");

        Ok(id)
    }

    /// Stop and remove `user`. The system user is never removed.
    pub fn remove_user(&self, user: UserId) -> Result<(), Error> {
        if user == UserId::SYSTEM || !self.list_user_ids()?.contains(&user) {
            return Ok(());
        }

        // stop output is not checked; debug-restricted users refuse to stop but still remove
        self.stop_user(user)?;

        // ephemeral users disappear once stopped
        if self.list_user_ids()?.contains(&user) {
            self.execute_expect_contains(&format!("pm remove-user {user}"), "Success")?;
        }
        crate::log!(Topic::Users, Info, "removed user {user}");

        Ok(())
    }

    /// Switch the foreground user and wait for the switch to land.
    pub fn switch_user(&self, user: UserId) -> Result<(), Error> {
        let timeouts = &self.config().timeouts;

        self.execute(&format!("am switch-user {user}"))?;
        poll::wait_until(
            "Could not switch users",
            timeouts.user_switch(),
            self.config().poll.interval(),
            || Ok::<_, Error>(self.current_user()? == user),
        )?;
        thread::sleep(timeouts.user_switch_settle());
        crate::log!(Topic::Users, Info, "switched to user {user}");

        Ok(())
    }

    /// `am stop-user -w -f`, waiting for the user to stop.
    pub fn stop_user(&self, user: UserId) -> Result<(), Error> {
        self.execute(&format!("am stop-user -w -f {user}"))?;

        Ok(())
    }

    /// `am stop-user -f` without waiting.
    pub fn stop_user_async(&self, user: UserId) -> Result<(), Error> {
        self.execute(&format!("am stop-user -f {user}"))?;

        Ok(())
    }

    pub fn start_user(&self, user: UserId) -> Result<(), Error> {
        self.execute_expect_contains(&format!("am start-user -w {user}"), "Success")?;

        Ok(())
    }
}

fn parse_created_user(output: &str) -> Option<UserId> {
    let mut tokens = output.split_whitespace();
    if tokens.next()? != "Success:" {
        return None;
    }

    tokens.last()?.parse().ok()
}

///
/// TESTS
///
