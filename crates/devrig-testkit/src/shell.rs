use crate::pm::{FakeApk, FakePackageManager};
use devrig_core::{
    dispatch::EXTRA_TARGET_PACKAGE,
    shell::{ShellError, ShellExecutor, ShellOutput},
};
use std::{
    collections::{BTreeMap, VecDeque},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

const RECEIVER_POLL: Duration = Duration::from_millis(5);

type Reply = Result<ShellOutput, ShellError>;

struct Rule {
    prefix: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    history: Vec<String>,
    files: BTreeMap<String, PathBuf>,
    props: BTreeMap<String, String>,
    settings: BTreeMap<String, String>,
    pm: FakePackageManager,
    offline: bool,
    package_receivers: BTreeMap<String, Duration>,
}

///
/// FakeShell
///
/// A device that answers from in-memory state: `pm` goes to a
/// [`FakePackageManager`], `getprop` to a property table, `settings` to a
/// key-value store. Scripted replies registered with [`FakeShell::reply`] take
/// precedence, newest first, and repeat their last reply once the others are
/// used up.
///
/// Broadcasts registered with [`FakeShell::await_package_added`] behave like
/// a companion receiver: the intent line streams out at once and the result
/// only follows when the target package shows up in the package manager.
///

#[derive(Default)]
pub struct FakeShell {
    state: Mutex<State>,
}

impl FakeShell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that reports `sys.boot_completed=1`.
    #[must_use]
    pub fn booted() -> Self {
        Self::new().prop("sys.boot_completed", "1")
    }

    #[must_use]
    pub fn prop(self, key: &str, value: &str) -> Self {
        self.lock().props.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn reply(self, prefix: &str, stdout: &str) -> Self {
        self.sequence(prefix, &[stdout])
    }

    #[must_use]
    pub fn sequence(self, prefix: &str, outputs: &[&str]) -> Self {
        let replies = outputs
            .iter()
            .map(|out| Ok(ShellOutput::stdout(*out)))
            .collect();
        self.push_rule(prefix, replies);
        self
    }

    #[must_use]
    pub fn fail(self, prefix: &str, err: ShellError) -> Self {
        self.push_rule(prefix, VecDeque::from([Err(err)]));
        self
    }

    /// `am broadcast -a <action>` answers `{"package": <target>}` once the
    /// target package is installed, or a `MissingBroadcastException` after
    /// `within`.
    #[must_use]
    pub fn await_package_added(self, action: &str, within: Duration) -> Self {
        self.lock()
            .package_receivers
            .insert(action.to_string(), within);
        self
    }

    /// Every command fails with device-not-available until set back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_setting(&self, namespace: &str, key: &str, value: &str) {
        self.lock()
            .settings
            .insert(format!("{namespace}/{key}"), value.to_string());
    }

    #[must_use]
    pub fn setting(&self, namespace: &str, key: &str) -> Option<String> {
        self.lock().settings.get(&format!("{namespace}/{key}")).cloned()
    }

    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Inspect the package manager state.
    pub fn with_pm<R>(&self, f: impl FnOnce(&FakePackageManager) -> R) -> R {
        f(&self.lock().pm)
    }

    /// Device paths currently holding a pushed file.
    #[must_use]
    pub fn staged(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    fn push_rule(&self, prefix: &str, replies: VecDeque<Reply>) {
        self.lock().rules.push(Rule {
            prefix: prefix.to_string(),
            replies,
        });
    }

    // (action, target, wait bound) when `command` goes to a package receiver
    fn package_receiver(&self, command: &str) -> Option<(String, String, Duration)> {
        let words: Vec<&str> = command.split_whitespace().collect();
        if !matches!(words.as_slice(), ["am", "broadcast", ..]) {
            return None;
        }

        let after = |flag: &str| {
            words
                .windows(2)
                .find(|w| w[0] == flag)
                .map(|w| w[1].trim_matches('\'').to_string())
        };
        let action = after("-a")?;
        let within = *self.lock().package_receivers.get(&action)?;
        let target = words
            .windows(3)
            .find(|w| w[0] == "--es" && w[1] == EXTRA_TARGET_PACKAGE)
            .map(|w| w[2].to_string())?;

        Some((action, target, within))
    }

    fn await_package(
        &self,
        command: &str,
        (action, target, within): (String, String, Duration),
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ShellOutput, ShellError> {
        {
            let mut state = self.lock();
            state.history.push(command.to_string());
            if state.offline {
                return Err(ShellError::DeviceNotAvailable(format!(
                    "error: device offline ({command})"
                )));
            }
        }

        let intent = format!("Broadcasting: Intent {{ act={action} flg=0x400000 }}");
        on_line(&intent);

        let deadline = Instant::now() + within;
        let added = loop {
            if self.lock().pm.is_installed(&target) {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            thread::sleep(RECEIVER_POLL);
        };

        let done = if added {
            format!("Broadcast completed: result=-1, data=\"{{\"package\":\"{target}\"}}\"")
        } else {
            format!(
                "Broadcast completed: result=0, data=\"{{\"kind\":\"MissingBroadcastException\",\
                 \"message\":\"{target} was not added\"}}\""
            )
        };
        on_line(&done);

        Ok(ShellOutput::stdout(format!("{intent}\n{done}\n")))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn scripted(&mut self, command: &str) -> Option<Reply> {
        let rule = self
            .rules
            .iter_mut()
            .rev()
            .find(|r| command.starts_with(&r.prefix))?;

        if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        }
    }

    fn builtin(&mut self, command: &str) -> ShellOutput {
        let words: Vec<&str> = command
            .split_whitespace()
            .map(|w| w.trim_matches('\''))
            .collect();

        match words.as_slice() {
            ["pm", args @ ..] => {
                let files = &self.files;
                self.pm
                    .handle(args, |path| files.get(path).and_then(|p| FakeApk::read(p).ok()))
            }
            ["getprop", key] => {
                ShellOutput::stdout(self.props.get(*key).cloned().unwrap_or_default())
            }
            ["settings", rest @ ..] => self.settings(rest),
            ["rm", "-f", path] => {
                self.files.remove(*path);
                ShellOutput::default()
            }
            _ => ShellOutput::default(),
        }
    }

    fn settings(&mut self, args: &[&str]) -> ShellOutput {
        // user scoping is not modelled
        let args: Vec<&str> = match args {
            [op, "--user", _, rest @ ..] => std::iter::once(*op).chain(rest.iter().copied()).collect(),
            _ => args.to_vec(),
        };

        match args.as_slice() {
            ["get", ns, key] => ShellOutput::stdout(
                self.settings
                    .get(&format!("{ns}/{key}"))
                    .cloned()
                    .unwrap_or_else(|| "null".to_string()),
            ),
            ["put", ns, key, value] => {
                self.settings.insert(format!("{ns}/{key}"), (*value).to_string());
                ShellOutput::default()
            }
            ["delete", ns, key] => {
                let deleted = self.settings.remove(&format!("{ns}/{key}")).is_some();
                ShellOutput::stdout(format!("Deleted {} rows", u8::from(deleted)))
            }
            _ => ShellOutput::stdout("Invalid command"),
        }
    }
}

impl ShellExecutor for FakeShell {
    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
        if let Some(receiver) = self.package_receiver(command) {
            return self.await_package(command, receiver, &mut |_| {});
        }

        let mut state = self.lock();
        state.history.push(command.to_string());

        if state.offline {
            return Err(ShellError::DeviceNotAvailable(format!(
                "error: device offline ({command})"
            )));
        }
        if let Some(reply) = state.scripted(command) {
            return reply;
        }

        Ok(state.builtin(command))
    }

    fn execute_streaming(
        &self,
        command: &str,
        _timeout: Option<Duration>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ShellOutput, ShellError> {
        if let Some(receiver) = self.package_receiver(command) {
            return self.await_package(command, receiver, on_line);
        }

        let output = self.execute(command)?;
        for line in output.stdout.lines() {
            on_line(line);
        }

        Ok(output)
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), ShellError> {
        let mut state = self.lock();
        if state.offline {
            return Err(ShellError::DeviceNotAvailable("error: device offline".to_string()));
        }
        state.files.insert(remote.to_string(), local.to_path_buf());

        Ok(())
    }

    fn wait_for_not_available(&self, _timeout: Duration) -> Result<(), ShellError> {
        Ok(())
    }

    fn wait_for_online(&self, _timeout: Duration) -> Result<(), ShellError> {
        self.lock().offline = false;

        Ok(())
    }

    fn describe(&self) -> String {
        "fake-device".to_string()
    }
}
