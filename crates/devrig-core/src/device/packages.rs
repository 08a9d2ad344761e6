use super::Device;
use crate::{
    Error,
    ids::{PackageName, UserId},
    install::StagedFile,
    log::Topic,
    shell::quote,
};
use std::path::Path;

const SPLITS_PREFIX: &str = "splits=[";

impl Device {
    /// Push a single APK to the staging directory and `pm install` it.
    pub fn install_package(&self, apk: &Path, args: &[&str]) -> Result<(), Error> {
        let staged = StagedFile::from_path(apk)?;
        let remote = format!("{}/{}", self.config().device.staging_dir, staged.name);
        self.shell().push_file(&staged.local, &remote)?;

        let mut command = String::from("pm install");
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        command.push(' ');
        command.push_str(&quote(&remote));

        let result = self.execute_expect_success(&command);
        if let Err(e) = self.execute(&format!("rm -f {}", quote(&remote))) {
            crate::log!(Topic::Packages, Warn, "failed to remove staged {remote}: {e}");
        }
        result?;
        crate::log!(Topic::Packages, Ok, "installed {}", staged.name);

        Ok(())
    }

    /// Install `apk` and uninstall `package` again when the guard drops.
    pub fn install_scoped(&self, apk: &Path, package: &PackageName) -> Result<PackageGuard, Error> {
        self.install_package(apk, &[])?;

        Ok(PackageGuard {
            device: self.clone(),
            package: package.clone(),
        })
    }

    /// `pm uninstall`. A package that was never installed is not an error.
    pub fn uninstall_package(&self, package: &PackageName) -> Result<(), Error> {
        let out = self.execute(&format!("pm uninstall {package}"))?;
        if !out.is_success() && !out.contains("Unknown package") && !out.contains("not installed")
        {
            crate::log!(Topic::Packages, Warn, "uninstall {package}: {}", out.trimmed());
        }

        Ok(())
    }

    /// `pm uninstall <package> <split>...`, removing individual splits only.
    pub fn uninstall_splits(&self, package: &PackageName, splits: &[&str]) -> Result<(), Error> {
        let mut command = format!("pm uninstall {package}");
        for split in splits {
            command.push(' ');
            command.push_str(&quote(split));
        }
        self.execute_expect_success(&command)?;

        Ok(())
    }

    /// Installed packages, optionally for one user.
    pub fn list_packages(&self, user: Option<UserId>) -> Result<Vec<PackageName>, Error> {
        let command = match user {
            Some(user) => format!("pm list packages --user {user}"),
            None => "pm list packages".to_string(),
        };
        let out = self.execute(&command)?;

        Ok(out
            .stdout
            .lines()
            .filter_map(|l| l.trim().strip_prefix("package:"))
            .filter_map(|p| PackageName::new(p).ok())
            .collect())
    }

    pub fn is_installed(&self, package: &PackageName) -> Result<bool, Error> {
        Ok(self.list_packages(None)?.contains(package))
    }

    /// Split names of an installed package, read from `pm dump`.
    ///
    /// The base APK is reported as `base`. A package that isn't installed
    /// has no splits.
    pub fn splits(&self, package: &PackageName) -> Result<Vec<String>, Error> {
        let out = self.execute(&format!("pm dump {package}"))?;

        Ok(parse_splits(&out.stdout).unwrap_or_default())
    }

    pub fn suspend(&self, package: &PackageName) -> Result<SuspendGuard, Error> {
        self.execute_expect_contains(&format!("pm suspend {package}"), "new suspended state: true")?;
        crate::log!(Topic::Packages, Info, "suspended {package}");

        Ok(SuspendGuard {
            device: self.clone(),
            package: package.clone(),
        })
    }

    pub fn unsuspend(&self, package: &PackageName) -> Result<(), Error> {
        self.execute_expect_contains(
            &format!("pm unsuspend {package}"),
            "new suspended state: false",
        )?;

        Ok(())
    }
}

/// The first `splits=[a, b]` line of a package dump.
fn parse_splits(dump: &str) -> Option<Vec<String>> {
    let line = dump.lines().map(str::trim).find(|l| l.starts_with(SPLITS_PREFIX))?;
    let inner = line.strip_prefix(SPLITS_PREFIX)?.strip_suffix(']')?;

    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

///
/// PackageGuard
/// Uninstalls its package on drop.
///

pub struct PackageGuard {
    device: Device,
    package: PackageName,
}

impl PackageGuard {
    #[must_use]
    pub const fn package(&self) -> &PackageName {
        &self.package
    }
}

impl Drop for PackageGuard {
    fn drop(&mut self) {
        if let Err(e) = self.device.uninstall_package(&self.package) {
            crate::log!(Topic::Packages, Warn, "failed to uninstall {}: {e}", self.package);
        }
    }
}

///
/// SuspendGuard
/// Unsuspends its package on drop.
///

pub struct SuspendGuard {
    device: Device,
    package: PackageName,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        if let Err(e) = self.device.unsuspend(&self.package) {
            crate::log!(Topic::Packages, Warn, "failed to unsuspend {}: {e}", self.package);
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
    use std::{io::Write, sync::Arc};

    fn pkg() -> PackageName {
        PackageName::new("com.android.cts.splitapp").unwrap()
    }

    #[test]
    fn splits_are_read_from_dump() {
        let dump = "Packages:\n  Package [com.android.cts.splitapp] (1a2b3c):\n    \
                    versionCode=1\n    splits=[base, config.xhdpi, feature_warm]\n    \
                    apkSigningVersion=2\n";
        let shell = Arc::new(ScriptShell::new().reply("pm dump", dump));

        assert_eq!(
            device(&shell).splits(&pkg()).unwrap(),
            vec!["base", "config.xhdpi", "feature_warm"]
        );
    }

    #[test]
    fn missing_package_has_no_splits() {
        let shell = Arc::new(ScriptShell::new().reply("pm dump", "Dump of package manager:\n"));

        assert!(device(&shell).splits(&pkg()).unwrap().is_empty());
    }

    #[test]
    fn list_packages_strips_prefix() {
        let shell = Arc::new(ScriptShell::new().reply(
            "pm list packages",
            "package:android\npackage:com.android.cts.splitapp\n",
        ));
        let dev = device(&shell);

        assert!(dev.is_installed(&pkg()).unwrap());
        assert!(!dev.is_installed(&PackageName::new("com.example.other").unwrap()).unwrap());
    }

    #[test]
    fn install_package_pushes_and_cleans_up() {
        let mut apk = tempfile::Builder::new().suffix(".apk").tempfile().unwrap();
        apk.write_all(b"PK\x03\x04").unwrap();
        let name = apk.path().file_name().unwrap().to_string_lossy().into_owned();

        let shell = Arc::new(ScriptShell::new().reply("pm install", "Success"));
        device(&shell).install_package(apk.path(), &["-t"]).unwrap();

        let remote = format!("/data/local/tmp/{name}");
        assert_eq!(shell.pushed()[0].1, remote);
        assert_eq!(
            shell.history(),
            vec![format!("pm install -t {remote}"), format!("rm -f {remote}")]
        );
    }

    #[test]
    fn failed_install_still_removes_staged_file() {
        let apk = tempfile::NamedTempFile::new().unwrap();
        let shell = Arc::new(ScriptShell::new().reply(
            "pm install",
            "Failure [INSTALL_FAILED_INVALID_APK]",
        ));

        let err = device(&shell).install_package(apk.path(), &[]).unwrap_err();

        assert!(err.message.contains("INSTALL_FAILED_INVALID_APK"));
        assert_eq!(shell.count("rm -f"), 1);
    }

    #[test]
    fn suspend_guard_unsuspends_on_drop() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm suspend", "Package com.android.cts.splitapp new suspended state: true")
                .reply("pm unsuspend", "Package com.android.cts.splitapp new suspended state: false"),
        );
        let guard = device(&shell).suspend(&pkg()).unwrap();
        assert_eq!(shell.count("pm unsuspend"), 0);

        drop(guard);
        assert_eq!(shell.count("pm unsuspend com.android.cts.splitapp"), 1);
    }

    #[test]
    fn uninstall_splits_requires_success() {
        let shell = Arc::new(ScriptShell::new().reply("pm uninstall", "Failure [DELETE_FAILED_INTERNAL_ERROR]"));

        assert!(device(&shell).uninstall_splits(&pkg(), &["feature_warm"]).is_err());
    }
}
