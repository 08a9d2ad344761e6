use super::{InstallSession, SessionError, StagedFile};
use crate::{
    ids::{PackageName, SessionId, UserId},
    log::Topic,
    shell::ShellExecutor,
};
use derive_more::Display;
use std::{path::PathBuf, sync::Arc};

///
/// InstallPhase
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum InstallPhase {
    #[display("create")]
    Create,

    #[display("write")]
    Write,

    #[display("commit")]
    Commit,
}

///
/// InstallOutcome
/// What the device said about a multi-file install. Harness failures are
/// reported as errors instead.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstallOutcome {
    Committed { session: SessionId },
    Failed { phase: InstallPhase, output: String },
}

impl InstallOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

///
/// InstallMultiple
///
/// Builder for a one-shot session install of one or more APKs:
///
/// ```ignore
/// ctx.install()
///     .add_file("CtsTestApp.apk")
///     .force_queryable()
///     .run()?;
/// ```
///

pub struct InstallMultiple {
    shell: Arc<dyn ShellExecutor>,
    staging_dir: String,
    files: Vec<(PathBuf, Option<String>)>,
    args: Vec<String>,
    user: Option<UserId>,
    inherit: Option<PackageName>,
}

impl InstallMultiple {
    pub fn new(shell: Arc<dyn ShellExecutor>, staging_dir: impl Into<String>) -> Self {
        Self {
            shell,
            staging_dir: staging_dir.into(),
            files: Vec::new(),
            args: Vec::new(),
            user: None,
            inherit: None,
        }
    }

    #[must_use]
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push((path.into(), None));
        self
    }

    /// Add a file written under an explicit split name.
    #[must_use]
    pub fn add_file_as(mut self, path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.files.push((path.into(), Some(name.into())));
        self
    }

    /// Raw `pm install-create` argument, passed through verbatim.
    #[must_use]
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Update an installed package in place (`-p`), keeping its other splits.
    #[must_use]
    pub fn inherit_from(mut self, package: PackageName) -> Self {
        self.inherit = Some(package);
        self
    }

    #[must_use]
    pub const fn for_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn force_queryable(self) -> Self {
        self.add_arg("--force-queryable")
    }

    #[must_use]
    pub fn allow_test(self) -> Self {
        self.add_arg("-t")
    }

    #[must_use]
    pub fn grant_permissions(self) -> Self {
        self.add_arg("-g")
    }

    #[must_use]
    pub fn dont_kill(self) -> Self {
        self.add_arg("--dont-kill")
    }

    /// The `pm install-create` argument list, in the order it is issued.
    #[must_use]
    pub fn create_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        if let Some(user) = self.user {
            args.push(format!("--user {user}"));
        }
        if let Some(package) = &self.inherit {
            args.push(format!("-p {package}"));
        }
        args.extend(self.args.iter().cloned());

        args
    }

    /// Stage, create, write, commit. Device-side failures become
    /// `InstallOutcome::Failed`; the open session is abandoned on the way out.
    pub fn execute(self) -> Result<InstallOutcome, SessionError> {
        let files = self
            .files
            .iter()
            .map(|(path, name)| {
                let staged = StagedFile::from_path(path)?;
                Ok(match name {
                    Some(name) => staged.with_name(name.clone()),
                    None => staged,
                })
            })
            .collect::<Result<Vec<_>, SessionError>>()?;

        let mut session = InstallSession::new(self.shell.clone(), self.staging_dir.clone());

        let session_id = match session.create(&self.create_args()) {
            Ok(id) => id,
            Err(SessionError::CreateFailed { output } | SessionError::MissingSessionId { output }) => {
                return Ok(InstallOutcome::Failed {
                    phase: InstallPhase::Create,
                    output,
                });
            }
            Err(e) => return Err(e),
        };

        match session.write(&files) {
            Ok(()) => {}
            Err(SessionError::WriteFailed { output, .. }) => {
                return Ok(InstallOutcome::Failed {
                    phase: InstallPhase::Write,
                    output,
                });
            }
            Err(e) => return Err(e),
        }

        match session.commit() {
            Ok(()) => Ok(InstallOutcome::Committed {
                session: session_id,
            }),
            Err(SessionError::CommitFailed { output, .. }) => Ok(InstallOutcome::Failed {
                phase: InstallPhase::Commit,
                output,
            }),
            Err(e) => Err(e),
        }
    }

    /// Install and require success.
    pub fn run(self) -> Result<SessionId, SessionError> {
        match self.execute()? {
            InstallOutcome::Committed { session } => Ok(session),
            InstallOutcome::Failed { phase, output } => {
                Err(SessionError::InstallFailed { phase, output })
            }
        }
    }

    /// Install and require a failure whose output contains `expected`.
    ///
    /// Returns the failure output.
    pub fn run_expecting_failure(self, expected: &str) -> Result<String, SessionError> {
        match self.execute()? {
            InstallOutcome::Committed { .. } => Err(SessionError::UnexpectedSuccess {
                expected: expected.to_string(),
            }),
            InstallOutcome::Failed { phase, output } if output.contains(expected) => {
                crate::log!(Topic::Install, Info, "install failed as expected during {phase}: {expected}");
                Ok(output)
            }
            InstallOutcome::Failed { phase, output } => Err(SessionError::UnexpectedFailure {
                expected: expected.to_string(),
                phase,
                output,
            }),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ScriptShell;
    use std::fs;

    fn apk(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"PK\x03\x04").unwrap();
        path
    }

    fn happy_shell() -> Arc<ScriptShell> {
        Arc::new(
            ScriptShell::new()
                .reply("pm install-create", "Success: created install session [12345]\n")
                .reply("pm install-write", "Success: streamed 4 bytes\n")
                .reply("pm install-commit", "Success\n"),
        )
    }

    #[test]
    fn create_args_put_user_and_inherit_first() {
        let shell = happy_shell();
        let b = InstallMultiple::new(shell, "/data/local/tmp")
            .force_queryable()
            .inherit_from(PackageName::new("com.example.app").unwrap())
            .for_user(UserId(10))
            .allow_test();

        assert_eq!(
            b.create_args(),
            vec!["--user 10", "-p com.example.app", "--force-queryable", "-t"]
        );
    }

    #[test]
    fn force_queryable_install_commits() {
        let dir = tempfile::tempdir().unwrap();
        let shell = happy_shell();

        let session = InstallMultiple::new(shell.clone(), "/data/local/tmp")
            .add_file(apk(&dir, "CtsApp.apk"))
            .force_queryable()
            .run()
            .unwrap();

        assert_eq!(session, SessionId(12345));
        assert_eq!(shell.history()[0], "pm install-create --force-queryable");
        assert_eq!(shell.history()[2], "pm install-commit 12345");
    }

    #[test]
    fn run_expecting_failure_matches_substring() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", "Success: created install session [9]\n")
                .reply("pm install-write", "Success: streamed 4 bytes\n")
                .reply(
                    "pm install-commit",
                    "Failure [INSTALL_FAILED_MISSING_SPLIT: Missing split for com.x]\n",
                ),
        );

        let output = InstallMultiple::new(shell, "/data/local/tmp")
            .add_file(apk(&dir, "split.apk"))
            .run_expecting_failure(crate::install::INSTALL_FAILED_MISSING_SPLIT)
            .unwrap();

        assert!(output.starts_with("Failure [INSTALL_FAILED_MISSING_SPLIT"));
    }

    #[test]
    fn run_expecting_failure_rejects_success() {
        let dir = tempfile::tempdir().unwrap();

        let err = InstallMultiple::new(happy_shell(), "/data/local/tmp")
            .add_file(apk(&dir, "base.apk"))
            .run_expecting_failure("INSTALL_FAILED")
            .unwrap_err();

        assert!(matches!(err, SessionError::UnexpectedSuccess { .. }));
    }

    #[test]
    fn write_failure_reports_phase_and_abandons() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", "Success: created install session [3]\n")
                .reply("pm install-write", "Error: Unable to open file\n")
                .reply("pm install-abandon", "Success\n"),
        );

        let outcome = InstallMultiple::new(shell.clone(), "/data/local/tmp")
            .add_file(apk(&dir, "base.apk"))
            .execute()
            .unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Failed {
                phase: InstallPhase::Write,
                output: "Error: Unable to open file".to_string(),
            }
        );
        assert_eq!(shell.count("pm install-abandon 3"), 1);
        assert_eq!(shell.count("pm install-commit"), 0);
    }

    #[test]
    fn missing_local_file_fails_before_any_command() {
        let shell = happy_shell();

        let err = InstallMultiple::new(shell.clone(), "/data/local/tmp")
            .add_file("/nonexistent/devrig/base.apk")
            .run()
            .unwrap_err();

        assert!(matches!(err, SessionError::StageFile { .. }));
        assert!(shell.history().is_empty());
    }
}
