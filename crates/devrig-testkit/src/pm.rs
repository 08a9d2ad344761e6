use devrig_core::{install::INSTALL_FAILED_MISSING_SPLIT, shell::ShellOutput};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};

const FIRST_SESSION: u32 = 12345;

///
/// FakeApk
///
/// A stand-in APK: a small `key=value` text file the fake package manager
/// reads back when the file is written into a session.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FakeApk {
    pub package: String,
    /// `None` for the base APK.
    pub split: Option<String>,
    /// Splits that must be present in the same install.
    pub requires: Vec<String>,
}

impl FakeApk {
    pub fn base(package: &str) -> Self {
        Self {
            package: package.to_string(),
            split: None,
            requires: Vec::new(),
        }
    }

    pub fn split(package: &str, name: &str) -> Self {
        Self {
            package: package.to_string(),
            split: Some(name.to_string()),
            requires: Vec::new(),
        }
    }

    #[must_use]
    pub fn requiring(mut self, split: &str) -> Self {
        self.requires.push(split.to_string());
        self
    }

    /// Split name as the package manager reports it.
    #[must_use]
    pub fn split_name(&self) -> &str {
        self.split.as_deref().unwrap_or("base")
    }

    /// Write into `dir` as `<file_name>`.
    pub fn write(&self, dir: &Path, file_name: &str) -> io::Result<PathBuf> {
        let mut body = format!("package={}\n", self.package);
        if let Some(split) = &self.split {
            body.push_str(&format!("split={split}\n"));
        }
        for req in &self.requires {
            body.push_str(&format!("requires={req}\n"));
        }

        let path = dir.join(file_name);
        fs::write(&path, body)?;

        Ok(path)
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let body = fs::read_to_string(path)?;
        let mut apk = Self::base("");

        for line in body.lines() {
            match line.split_once('=') {
                Some(("package", v)) => apk.package = v.to_string(),
                Some(("split", v)) => apk.split = Some(v.to_string()),
                Some(("requires", v)) => apk.requires.push(v.to_string()),
                _ => {}
            }
        }
        if apk.package.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a fake apk"));
        }

        Ok(apk)
    }
}

#[derive(Debug, Default)]
struct FakeSession {
    inherit: Option<String>,
    force_queryable: bool,
    apks: Vec<FakeApk>,
    removed: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct Installed {
    apks: BTreeMap<String, FakeApk>,
    queryable: bool,
    suspended: bool,
}

///
/// FakePackageManager
///
/// Enough of `pm` to drive session installs: sessions keep written APKs until
/// commit, inheriting sessions start from the installed splits, and a commit
/// that leaves a required split out fails with `INSTALL_FAILED_MISSING_SPLIT`.
///

#[derive(Debug)]
pub struct FakePackageManager {
    next_session: u32,
    sessions: BTreeMap<u32, FakeSession>,
    packages: BTreeMap<String, Installed>,
}

impl Default for FakePackageManager {
    fn default() -> Self {
        Self {
            next_session: FIRST_SESSION,
            sessions: BTreeMap::new(),
            packages: BTreeMap::new(),
        }
    }
}

impl FakePackageManager {
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_installed(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    #[must_use]
    pub fn is_queryable(&self, package: &str) -> bool {
        self.packages.get(package).is_some_and(|p| p.queryable)
    }

    #[must_use]
    pub fn is_suspended(&self, package: &str) -> bool {
        self.packages.get(package).is_some_and(|p| p.suspended)
    }

    pub fn splits(&self, package: &str) -> Vec<String> {
        self.packages
            .get(package)
            .map(|p| p.apks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Handle one `pm` command line. `read_file` resolves a device path to
    /// the APK pushed there.
    pub fn handle(
        &mut self,
        args: &[&str],
        read_file: impl Fn(&str) -> Option<FakeApk>,
    ) -> ShellOutput {
        let reply = match args {
            ["install-create", rest @ ..] => self.create(rest),
            ["install-write", rest @ ..] => self.write(rest, read_file),
            ["install-remove", id, names @ ..] => self.remove(id, names),
            ["install-commit", id] => self.commit(id),
            ["install-abandon", id] => self.abandon(id),
            ["install", rest @ ..] => self.install_single(rest, read_file),
            ["uninstall", package, splits @ ..] => self.uninstall(package, splits),
            ["list", "packages", ..] => self.list(),
            ["dump", package] => self.dump(package),
            ["suspend", package] => self.set_suspended(package, true),
            ["unsuspend", package] => self.set_suspended(package, false),
            _ => format!("Unknown command: {}", args.join(" ")),
        };

        ShellOutput::stdout(reply)
    }

    fn create(&mut self, args: &[&str]) -> String {
        let mut session = FakeSession::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match *arg {
                "-p" => session.inherit = iter.next().map(ToString::to_string),
                "--user" => {
                    iter.next();
                }
                "--force-queryable" => session.force_queryable = true,
                _ => {}
            }
        }
        if let Some(package) = &session.inherit
            && !self.packages.contains_key(package)
        {
            return format!("Error: package {package} not installed");
        }

        let id = self.next_session;
        self.next_session += 1;
        self.sessions.insert(id, session);

        format!("Success: created install session [{id}]")
    }

    fn write(&mut self, args: &[&str], read_file: impl Fn(&str) -> Option<FakeApk>) -> String {
        let ["-S", size, id, _name, path] = args else {
            return "Error: bad install-write arguments".to_string();
        };
        let Some(session) = parse_id(id).and_then(|id| self.sessions.get_mut(&id)) else {
            return format!("Failure [INSTALL_FAILED_INVALID_SESSION: {id}]");
        };
        let Some(apk) = read_file(path) else {
            return format!("Error: Unable to open file: {path}");
        };

        session.apks.push(apk);

        format!("Success: streamed {size} bytes")
    }

    fn remove(&mut self, id: &str, names: &[&str]) -> String {
        let Some(session) = parse_id(id).and_then(|id| self.sessions.get_mut(&id)) else {
            return format!("Failure [INSTALL_FAILED_INVALID_SESSION: {id}]");
        };
        session.removed.extend(names.iter().map(ToString::to_string));

        "Success".to_string()
    }

    fn abandon(&mut self, id: &str) -> String {
        match parse_id(id).and_then(|id| self.sessions.remove(&id)) {
            Some(_) => "Success".to_string(),
            None => format!("Failure [INSTALL_FAILED_INVALID_SESSION: {id}]"),
        }
    }

    fn commit(&mut self, id: &str) -> String {
        let Some(session) = parse_id(id).and_then(|id| self.sessions.remove(&id)) else {
            return format!("Failure [INSTALL_FAILED_INVALID_SESSION: {id}]");
        };

        match self.apply(session) {
            Ok(()) => "Success".to_string(),
            Err(reason) => format!("Failure [{reason}]"),
        }
    }

    fn apply(&mut self, session: FakeSession) -> Result<(), String> {
        let package = match (&session.inherit, session.apks.first()) {
            (Some(p), _) => p.clone(),
            (None, Some(apk)) => apk.package.clone(),
            (None, None) => return Err("INSTALL_FAILED_INVALID_APK: no APKs".to_string()),
        };
        if let Some(other) = session.apks.iter().find(|a| a.package != package) {
            return Err(format!(
                "INSTALL_FAILED_INVALID_APK: inconsistent package {}",
                other.package
            ));
        }

        let mut result = match &session.inherit {
            Some(p) => self.packages.get(p).cloned().unwrap_or_default(),
            None => Installed::default(),
        };
        for name in &session.removed {
            result.apks.remove(name);
        }
        for apk in session.apks {
            result.apks.insert(apk.split_name().to_string(), apk);
        }

        if !result.apks.contains_key("base") {
            return Err(format!(
                "{INSTALL_FAILED_MISSING_SPLIT}: Missing split for {package}"
            ));
        }
        let present: BTreeSet<&str> = result.apks.keys().map(String::as_str).collect();
        for apk in result.apks.values() {
            if let Some(missing) = apk.requires.iter().find(|r| !present.contains(r.as_str())) {
                return Err(format!(
                    "{INSTALL_FAILED_MISSING_SPLIT}: Missing split for {package}: {missing}"
                ));
            }
        }

        result.queryable |= session.force_queryable;
        self.packages.insert(package, result);

        Ok(())
    }

    fn install_single(&mut self, args: &[&str], read_file: impl Fn(&str) -> Option<FakeApk>) -> String {
        let Some(path) = args.last() else {
            return "Error: no APK given".to_string();
        };
        let Some(apk) = read_file(path) else {
            return format!("Error: Unable to open file: {path}");
        };
        let session = FakeSession {
            force_queryable: args.contains(&"--force-queryable"),
            apks: vec![apk],
            ..FakeSession::default()
        };

        match self.apply(session) {
            Ok(()) => "Success".to_string(),
            Err(reason) => format!("Failure [{reason}]"),
        }
    }

    fn uninstall(&mut self, package: &str, splits: &[&str]) -> String {
        let Some(installed) = self.packages.get_mut(package) else {
            return "Failure [DELETE_FAILED_INTERNAL_ERROR]".to_string();
        };
        if splits.is_empty() {
            self.packages.remove(package);
            return "Success".to_string();
        }
        if splits.contains(&"base") || splits.iter().any(|s| !installed.apks.contains_key(*s)) {
            return "Failure [DELETE_FAILED_INTERNAL_ERROR]".to_string();
        }
        for split in splits {
            installed.apks.remove(*split);
        }

        "Success".to_string()
    }

    fn list(&self) -> String {
        self.packages
            .keys()
            .map(|p| format!("package:{p}\n"))
            .collect()
    }

    fn dump(&self, package: &str) -> String {
        match self.packages.get(package) {
            Some(installed) => format!(
                "Packages:\n  Package [{package}] (fake):\n    versionCode=1\n    splits=[{}]\n",
                installed.apks.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            None => "Dump of package manager:\n".to_string(),
        }
    }

    fn set_suspended(&mut self, package: &str, suspended: bool) -> String {
        match self.packages.get_mut(package) {
            Some(installed) => {
                installed.suspended = suspended;
                format!("Package {package} new suspended state: {suspended}")
            }
            None => format!("Error: package {package} not found"),
        }
    }
}

fn parse_id(raw: &str) -> Option<u32> {
    raw.parse().ok()
}
