use super::{Device, DeviceOpsError};
use crate::{Error, shell::quote};

impl Device {
    /// `getprop <name>`, `None` when unset.
    pub fn getprop(&self, name: &str) -> Result<Option<String>, Error> {
        let value = self.stdout(&format!("getprop {}", quote(name)))?;

        Ok((!value.is_empty()).then_some(value))
    }

    pub fn sdk_level(&self) -> Result<u32, Error> {
        let raw = self.getprop("ro.build.version.sdk")?.unwrap_or_default();

        raw.parse().map_err(|_| {
            DeviceOpsError::Parse {
                what: "sdk level",
                output: raw,
            }
            .into()
        })
    }

    pub fn has_file_based_encryption(&self) -> Result<bool, Error> {
        Ok(self.getprop("ro.crypto.type")?.as_deref() == Some("file"))
    }

    pub fn is_headless_system_user_mode(&self) -> Result<bool, Error> {
        Ok(self.getprop("ro.fw.mu.headless_system_user")?.as_deref() == Some("true"))
    }

    /// Whether `pm list features` reports `feature`.
    pub fn has_feature(&self, feature: &str) -> Result<bool, Error> {
        let out = self.execute("pm list features")?;

        Ok(out
            .stdout
            .lines()
            .filter_map(|l| l.trim().strip_prefix("feature:"))
            .any(|f| f == feature || f.split_once('=').is_some_and(|(name, _)| name == feature)))
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use crate::test::{ScriptShell, device};
    use std::sync::Arc;

    #[test]
    fn empty_property_is_none() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("getprop ro.crypto.type", "file\n")
                .reply("getprop ro.missing", "\n"),
        );
        let dev = device(&shell);

        assert_eq!(dev.getprop("ro.missing").unwrap(), None);
        assert!(dev.has_file_based_encryption().unwrap());
    }

    #[test]
    fn sdk_level_parses_or_fails() {
        let shell = Arc::new(ScriptShell::new().reply("getprop ro.build.version.sdk", "34\n"));
        assert_eq!(device(&shell).sdk_level().unwrap(), 34);

        let shell = Arc::new(ScriptShell::new().reply("getprop ro.build.version.sdk", "S\n"));
        assert!(device(&shell).sdk_level().is_err());
    }

    #[test]
    fn features_match_exact_names() {
        let shell = Arc::new(ScriptShell::new().reply(
            "pm list features",
            "feature:android.software.secure_lock_screen\nfeature:reqGlEsVersion=0x30002\n",
        ));
        let dev = device(&shell);

        assert!(dev.has_feature("android.software.secure_lock_screen").unwrap());
        assert!(dev.has_feature("reqGlEsVersion").unwrap());
        assert!(!dev.has_feature("android.software.secure").unwrap());
    }
}
