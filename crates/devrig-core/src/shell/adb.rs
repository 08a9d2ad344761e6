use super::{ShellError, ShellExecutor, ShellOutput};
use crate::{config::ConfigModel, log::Topic};
use std::{
    io::{BufRead, BufReader, Read},
    path::Path,
    process::{Child, Command, Stdio},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use wait_timeout::ChildExt;

// stderr fragments adb prints when the transport is gone
const UNAVAILABLE_MARKERS: &[&str] = &[
    "device offline",
    "no devices/emulators found",
    "device unauthorized",
    "not found",
    "closed",
];

const STATE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STATE_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

///
/// AdbExecutor
///
/// Runs commands through the `adb` binary. Every invocation is bounded by a
/// harness-side timeout; a hung adb is killed rather than waited on.
///

#[derive(Clone, Debug)]
pub struct AdbExecutor {
    adb: String,
    serial: Option<String>,
    command_timeout: Duration,
}

impl AdbExecutor {
    #[must_use]
    pub fn new(adb: impl Into<String>, serial: Option<String>, command_timeout: Duration) -> Self {
        Self {
            adb: adb.into(),
            serial,
            command_timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &ConfigModel) -> Self {
        Self::new(
            config.device.adb.clone(),
            config.device.serial.clone(),
            config.timeouts.shell_command(),
        )
    }

    #[must_use]
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb);
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial]);
        }

        cmd
    }

    fn run_adb(&self, args: &[&str], timeout: Duration) -> Result<ShellOutput, ShellError> {
        self.run_adb_streaming(args, timeout, &mut |_| {})
    }

    fn run_adb_streaming(
        &self,
        args: &[&str],
        timeout: Duration,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ShellOutput, ShellError> {
        let label = args.join(" ");
        let deadline = Instant::now() + timeout;
        let mut cmd = self.command();
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| ShellError::Spawn {
            program: self.adb.clone(),
            reason: e.to_string(),
        })?;

        // drain both pipes while waiting so a chatty command cannot fill them
        let (line_tx, line_rx) = mpsc::channel();
        let stdout_thread = spawn_line_reader(child.stdout.take(), line_tx);
        let stderr_thread = spawn_reader(child.stderr.take());

        loop {
            match line_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(line) => on_line(&line),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    abandon(&mut child, stdout_thread, stderr_thread);
                    return Err(ShellError::Timeout {
                        command: label,
                        timeout_ms: timeout.as_millis(),
                    });
                }
            }
        }

        let status = match child.wait_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Some(status)) => status,
            Ok(None) => {
                abandon(&mut child, stdout_thread, stderr_thread);
                return Err(ShellError::Timeout {
                    command: label,
                    timeout_ms: timeout.as_millis(),
                });
            }
            Err(e) => {
                reap(&mut child);
                return Err(ShellError::Io(format!("failed to wait for adb: {e}")));
            }
        };

        let stdout = join_reader(stdout_thread);
        let stderr = join_reader(stderr_thread);

        if !status.success() && is_unavailable(&stderr) {
            return Err(ShellError::DeviceNotAvailable(stderr.trim().to_string()));
        }

        Ok(ShellOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }

    /// `adb get-state`, or `None` when the device is not attached.
    fn state(&self) -> Option<String> {
        match self.run_adb(&["get-state"], STATE_QUERY_TIMEOUT) {
            Ok(out) if out.exit_code == Some(0) => Some(out.stdout.trim().to_string()),
            _ => None,
        }
    }

    fn wait_for_state(
        &self,
        timeout: Duration,
        online: bool,
        what: &'static str,
    ) -> Result<(), ShellError> {
        let deadline = Instant::now() + timeout;
        loop {
            let is_online = self.state().as_deref() == Some("device");
            if is_online == online {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ShellError::DeviceNotAvailable(format!(
                    "{} did not become {what} within {}ms",
                    self.describe(),
                    timeout.as_millis()
                )));
            }

            thread::sleep(STATE_POLL_INTERVAL);
        }
    }
}

impl ShellExecutor for AdbExecutor {
    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
        self.run_adb(&["shell", command], self.command_timeout)
    }

    fn execute_streaming(
        &self,
        command: &str,
        timeout: Option<Duration>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ShellOutput, ShellError> {
        self.run_adb_streaming(
            &["shell", command],
            timeout.unwrap_or(self.command_timeout),
            on_line,
        )
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), ShellError> {
        let local_str = local.to_string_lossy();
        let out = self.run_adb(&["push", &local_str, remote], self.command_timeout)?;
        if out.exit_code != Some(0) {
            return Err(ShellError::CommandFailed {
                command: format!("push {local_str} {remote}"),
                output: out.combined(),
            });
        }

        crate::log!(Topic::Shell, Debug, "pushed {local_str} -> {remote}");

        Ok(())
    }

    fn wait_for_not_available(&self, timeout: Duration) -> Result<(), ShellError> {
        self.wait_for_state(timeout, false, "unavailable")
    }

    fn wait_for_online(&self, timeout: Duration) -> Result<(), ShellError> {
        self.wait_for_state(timeout, true, "online")
    }

    fn describe(&self) -> String {
        self.serial
            .clone()
            .unwrap_or_else(|| "default device".to_string())
    }
}

fn is_unavailable(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();

    stderr.starts_with("error:") && UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m))
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);

            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

// forwards each stdout line as it arrives and returns the whole text at EOF
fn spawn_line_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
    lines: Sender<String>,
) -> Option<JoinHandle<String>> {
    pipe.map(|pipe| {
        thread::spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut all = String::new();
            let mut buf = Vec::new();

            while matches!(reader.read_until(b'\n', &mut buf), Ok(n) if n > 0) {
                let text = String::from_utf8_lossy(&buf);
                all.push_str(&text);
                // the caller may have stopped listening after a timeout
                let _ = lines.send(text.trim_end_matches(['\r', '\n']).to_string());
                buf.clear();
            }

            all
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn abandon(
    child: &mut Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
) {
    reap(child);
    join_reader(stdout);
    join_reader(stderr);
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        crate::log!(Topic::Shell, Warn, "failed to kill adb: {e}");
    }
    let _ = child.wait();
}

///
/// TESTS
///
