use super::SessionError;
use crate::{
    ids::SessionId,
    log::Topic,
    shell::{self, ShellExecutor, quote},
};
use derive_more::Display;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

///
/// SessionState
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SessionState {
    Pending,
    Created,
    Written,
    Committed,
    Abandoned,
    Failed,
}

impl SessionState {
    const fn is_open(self) -> bool {
        matches!(self, Self::Created | Self::Written)
    }
}

///
/// StagedFile
/// A host APK plus the split name it is written under.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedFile {
    pub local: PathBuf,
    pub name: String,
    pub size: u64,
}

impl StagedFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let stage_err = |reason: String| SessionError::StageFile {
            path: path.display().to_string(),
            reason,
        };

        let meta = fs::metadata(path).map_err(|e| stage_err(e.to_string()))?;
        if !meta.is_file() {
            return Err(stage_err("not a regular file".to_string()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| stage_err("path has no file name".to_string()))?;

        Ok(Self {
            local: path.to_path_buf(),
            name,
            size: meta.len(),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

///
/// InstallSession
///
/// One package-manager session driven through create, write, commit.
/// Operations in the wrong state fail before any command is issued.
///
/// A session that was created but neither committed nor abandoned is
/// abandoned on drop unless `keep_on_drop` was called.
///

pub struct InstallSession {
    shell: Arc<dyn ShellExecutor>,
    staging_dir: String,
    id: Option<SessionId>,
    state: SessionState,
    written: Vec<String>,
    // true while the device still holds the session
    live: bool,
    abandon_on_drop: bool,
}

impl InstallSession {
    pub fn new(shell: Arc<dyn ShellExecutor>, staging_dir: impl Into<String>) -> Self {
        Self {
            shell,
            staging_dir: staging_dir.into().trim_end_matches('/').to_string(),
            id: None,
            state: SessionState::Pending,
            written: Vec::new(),
            live: false,
            abandon_on_drop: true,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Option<SessionId> {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Split names written so far, in write order.
    #[must_use]
    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub const fn keep_on_drop(&mut self) {
        self.abandon_on_drop = false;
    }

    /// `pm install-create <args>`.
    pub fn create(&mut self, args: &[String]) -> Result<SessionId, SessionError> {
        self.expect(SessionState::Pending == self.state, "create")?;

        let mut command = "pm install-create".to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }

        let output = self.guarded(|s| shell::run(&*s.shell, &command).map_err(Into::into))?;
        if !output.is_success() {
            self.state = SessionState::Failed;
            return Err(SessionError::CreateFailed {
                output: output.combined(),
            });
        }
        let Some(id) = parse_session_id(&output.stdout) else {
            self.state = SessionState::Failed;
            return Err(SessionError::MissingSessionId {
                output: output.combined(),
            });
        };

        self.id = Some(id);
        self.state = SessionState::Created;
        self.live = true;
        crate::log!(Topic::Install, Info, "created install session {id}");

        Ok(id)
    }

    /// Push each file to the staging dir and `pm install-write` it.
    ///
    /// Stops at the first failure; files already written stay in the session.
    pub fn write(&mut self, files: &[StagedFile]) -> Result<(), SessionError> {
        self.expect(self.state.is_open(), "write")?;
        let id = self.require_id()?;

        for file in files {
            let remote = format!("{}/{}", self.staging_dir, file.name);
            self.guarded(|s| {
                s.shell
                    .push_file(&file.local, &remote)
                    .map_err(SessionError::from)
            })?;

            let command = format!(
                "pm install-write -S {} {id} {} {}",
                file.size,
                quote(&file.name),
                quote(&remote)
            );
            let output = self.guarded(|s| shell::run(&*s.shell, &command).map_err(Into::into))?;
            if !output.is_success() {
                self.state = SessionState::Failed;
                return Err(SessionError::WriteFailed {
                    id: id.to_string(),
                    name: file.name.clone(),
                    output: output.combined(),
                });
            }

            crate::log!(Topic::Install, Debug, "session {id}: wrote {} ({} bytes)", file.name, file.size);
            self.written.push(file.name.clone());
            self.state = SessionState::Written;
        }

        Ok(())
    }

    /// `pm install-remove <id> <names..>`, dropping splits from an update session.
    pub fn remove(&mut self, split_names: &[&str]) -> Result<(), SessionError> {
        self.expect(self.state.is_open(), "remove")?;
        let id = self.require_id()?;

        let names: Vec<_> = split_names.iter().map(|n| quote(n).into_owned()).collect();
        let command = format!("pm install-remove {id} {}", names.join(" "));
        let output = self.guarded(|s| shell::run(&*s.shell, &command).map_err(Into::into))?;
        if !output.is_success() {
            self.state = SessionState::Failed;
            return Err(SessionError::RemoveFailed {
                id: id.to_string(),
                output: output.combined(),
            });
        }

        self.state = SessionState::Written;

        Ok(())
    }

    /// `pm install-commit <id>`. The session is spent whatever the outcome.
    pub fn commit(&mut self) -> Result<(), SessionError> {
        self.expect(self.state.is_open(), "commit")?;
        let id = self.require_id()?;

        let command = format!("pm install-commit {id}");
        let result = shell::run(&*self.shell, &command);
        self.live = false;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        };
        if !output.is_success() {
            self.state = SessionState::Failed;
            crate::log!(Topic::Install, Warn, "session {id}: commit failed: {}", output.trimmed());

            return Err(SessionError::CommitFailed {
                id: id.to_string(),
                output: output.combined(),
            });
        }

        self.state = SessionState::Committed;
        crate::log!(Topic::Install, Ok, "committed install session {id}");

        Ok(())
    }

    /// `pm install-abandon <id>`.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        self.expect(self.live, "abandon")?;
        let id = self.require_id()?;

        let output = shell::run(&*self.shell, &format!("pm install-abandon {id}"))?;
        self.live = false;
        if !output.is_success() {
            self.state = SessionState::Failed;
            return Err(SessionError::AbandonFailed {
                id: id.to_string(),
                output: output.combined(),
            });
        }

        self.state = SessionState::Abandoned;
        crate::log!(Topic::Install, Info, "abandoned install session {id}");

        Ok(())
    }

    fn expect(&self, allowed: bool, op: &'static str) -> Result<(), SessionError> {
        if allowed {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                op,
                state: self.state,
            })
        }
    }

    fn require_id(&self) -> Result<SessionId, SessionError> {
        self.id.ok_or(SessionError::InvalidTransition {
            op: "use",
            state: self.state,
        })
    }

    // any device-side error leaves the session failed
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&Self) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let result = f(self);
        if result.is_err() {
            self.state = SessionState::Failed;
        }

        result
    }
}

impl Drop for InstallSession {
    fn drop(&mut self) {
        if !(self.live && self.abandon_on_drop) {
            return;
        }
        let Some(id) = self.id else {
            return;
        };

        match shell::run(&*self.shell, &format!("pm install-abandon {id}")) {
            Ok(out) if out.is_success() => {
                crate::log!(Topic::Install, Info, "abandoned unfinished install session {id}");
            }
            Ok(out) => {
                crate::log!(Topic::Install, Warn, "failed to abandon session {id}: {}", out.trimmed());
            }
            Err(e) => {
                crate::log!(Topic::Install, Warn, "failed to abandon session {id}: {e}");
            }
        }
    }
}

/// Session id from `Success: created install session [123]`.
fn parse_session_id(output: &str) -> Option<SessionId> {
    let open = output.rfind('[')?;
    let rest = &output[open + 1..];
    let close = rest.find(']')?;

    rest[..close].parse().ok()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ScriptShell;

    const CREATED: &str = "Success: created install session [1234]\n";

    fn session(shell: &Arc<ScriptShell>) -> InstallSession {
        InstallSession::new(shell.clone(), "/data/local/tmp/")
    }

    fn staged(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> StagedFile {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        StagedFile::from_path(path).unwrap()
    }

    #[test]
    fn parse_session_id_reads_bracketed_number() {
        assert_eq!(parse_session_id(CREATED), Some(SessionId(1234)));
        assert_eq!(parse_session_id("Success: [12345]"), Some(SessionId(12345)));
        assert_eq!(parse_session_id("Success: created install session"), None);
        assert_eq!(parse_session_id("Success: [abc]"), None);
    }

    #[test]
    fn commit_before_create_issues_no_command() {
        let shell = Arc::new(ScriptShell::new());
        let mut s = session(&shell);

        let err = s.commit().unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                op: "commit",
                state: SessionState::Pending
            }
        ));
        assert!(shell.history().is_empty());
        assert_eq!(s.state(), SessionState::Pending);
    }

    #[test]
    fn write_after_commit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", CREATED)
                .reply("pm install-commit", "Success\n"),
        );
        let mut s = session(&shell);
        s.create(&[]).unwrap();
        s.commit().unwrap();

        let before = shell.history().len();
        let err = s.write(&[staged(&dir, "base.apk", b"apk")]).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { op: "write", .. }));
        assert_eq!(shell.history().len(), before);
    }

    #[test]
    fn full_sequence_issues_expected_commands() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", CREATED)
                .reply("pm install-write", "Success: streamed 3 bytes\n")
                .reply("pm install-commit", "Success\n"),
        );
        let mut s = session(&shell);

        let id = s
            .create(&["--user 10".to_string(), "--force-queryable".to_string()])
            .unwrap();
        s.write(&[staged(&dir, "base.apk", b"apk")]).unwrap();
        s.commit().unwrap();

        assert_eq!(id, SessionId(1234));
        assert_eq!(s.state(), SessionState::Committed);
        assert_eq!(
            shell.history(),
            vec![
                "pm install-create --user 10 --force-queryable".to_string(),
                "pm install-write -S 3 1234 base.apk /data/local/tmp/base.apk".to_string(),
                "pm install-commit 1234".to_string(),
            ]
        );
        assert_eq!(shell.pushed()[0].1, "/data/local/tmp/base.apk");
    }

    #[test]
    fn success_substring_is_not_success() {
        let shell = Arc::new(ScriptShell::new().reply(
            "pm install-create",
            "Failure [Success: created install session [1]]",
        ));
        let mut s = session(&shell);

        let err = s.create(&[]).unwrap_err();
        assert!(matches!(err, SessionError::CreateFailed { .. }));
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[test]
    fn failed_commit_keeps_output() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", CREATED)
                .reply(
                    "pm install-commit",
                    "Failure [INSTALL_FAILED_MISSING_SPLIT: Missing split for com.x]\n",
                ),
        );
        let mut s = session(&shell);
        s.create(&[]).unwrap();

        let err = s.commit().unwrap_err();
        assert!(err.to_string().contains("INSTALL_FAILED_MISSING_SPLIT"));
        assert_eq!(s.state(), SessionState::Failed);

        drop(s);
        assert_eq!(shell.count("pm install-abandon"), 0);
    }

    #[test]
    fn dropping_open_session_abandons_it() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", CREATED)
                .reply("pm install-abandon", "Success\n"),
        );
        {
            let mut s = session(&shell);
            s.create(&[]).unwrap();
        }

        assert_eq!(shell.count("pm install-abandon 1234"), 1);
    }

    #[test]
    fn keep_on_drop_leaves_session_alone() {
        let shell = Arc::new(ScriptShell::new().reply("pm install-create", CREATED));
        {
            let mut s = session(&shell);
            s.create(&[]).unwrap();
            s.keep_on_drop();
        }

        assert_eq!(shell.count("pm install-abandon"), 0);
    }

    #[test]
    fn partial_write_failure_stops_and_marks_failed() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", CREATED)
                .reply("pm install-write", "Success: streamed 1 bytes\n")
                .reply("pm install-write -S 2 1234 split.apk", "Error: bad apk\n")
                .reply("pm install-abandon", "Success\n"),
        );
        let mut s = session(&shell);
        s.create(&[]).unwrap();

        let err = s
            .write(&[
                staged(&dir, "base.apk", b"a"),
                staged(&dir, "split.apk", b"bb"),
                staged(&dir, "other.apk", b"c"),
            ])
            .unwrap_err();

        assert!(matches!(err, SessionError::WriteFailed { ref name, .. } if name == "split.apk"));
        assert_eq!(s.written(), ["base.apk".to_string()]);
        assert_eq!(shell.count("pm install-write"), 2);
        assert!(matches!(
            s.commit().unwrap_err(),
            SessionError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn remove_and_abandon() {
        let shell = Arc::new(
            ScriptShell::new()
                .reply("pm install-create", CREATED)
                .reply("pm install-remove", "Success\n")
                .reply("pm install-abandon", "Success\n"),
        );
        let mut s = session(&shell);
        s.create(&["-p com.example.app".to_string()]).unwrap();
        s.remove(&["config.hdpi", "config.xxhdpi"]).unwrap();
        s.abandon().unwrap();

        assert_eq!(s.state(), SessionState::Abandoned);
        assert!(
            shell
                .history()
                .contains(&"pm install-remove 1234 config.hdpi config.xxhdpi".to_string())
        );
        assert!(matches!(
            s.abandon().unwrap_err(),
            SessionError::InvalidTransition { op: "abandon", .. }
        ));
    }
}
