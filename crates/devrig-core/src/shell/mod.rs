//! Raw command execution against a device.
//!
//! Everything above this layer speaks in shell command strings; the executor
//! decides how they reach the device. `AdbExecutor` is the production
//! implementation, the testkit provides a scripted one.

mod adb;

pub use adb::AdbExecutor;

use crate::{
    Error, ThisError,
    log::{self, Topic},
};
use std::{borrow::Cow, path::Path, time::Duration};

/// Literal prefix every successful package-manager command prints.
pub const SUCCESS_MARKER: &str = "Success";

///
/// ShellError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ShellError {
    #[error("command '{command}' failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("command '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u128 },

    #[error("operation '{0}' is not supported by this executor")]
    Unsupported(&'static str),
}

impl From<ShellError> for Error {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::DeviceNotAvailable(_) => Self::device(err.to_string()),
            ShellError::Timeout { .. } => Self::timeout(err.to_string()),
            _ => Self::shell(err.to_string()),
        }
    }
}

///
/// ShellOutput
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    #[must_use]
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Strict success check: the marker must open the output, not merely appear in it.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stdout.starts_with(SUCCESS_MARKER)
    }

    #[must_use]
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }

    /// stdout followed by stderr, for error messages.
    #[must_use]
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();

        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

///
/// ShellExecutor
///
/// The only seam between the harness and a device. Implementations must be
/// shareable across the test thread, the dispatch looper and guard drops.
///

pub trait ShellExecutor: Send + Sync {
    /// Run one `sh -c` style command line on the device.
    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError>;

    /// Run a command, handing each stdout line to `on_line` as the device
    /// prints it. `timeout` replaces the executor's own bound for this call.
    ///
    /// Executors that cannot stream replay the lines once the command is done.
    fn execute_streaming(
        &self,
        command: &str,
        _timeout: Option<Duration>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ShellOutput, ShellError> {
        let output = self.execute(command)?;
        for line in output.stdout.lines() {
            on_line(line);
        }

        Ok(output)
    }

    /// Copy a host file to an absolute device path.
    fn push_file(&self, _local: &Path, _remote: &str) -> Result<(), ShellError> {
        Err(ShellError::Unsupported("push_file"))
    }

    /// Block until the device has dropped off the transport.
    fn wait_for_not_available(&self, _timeout: Duration) -> Result<(), ShellError> {
        Err(ShellError::Unsupported("wait_for_not_available"))
    }

    /// Block until the device is reachable again.
    fn wait_for_online(&self, _timeout: Duration) -> Result<(), ShellError> {
        Err(ShellError::Unsupported("wait_for_online"))
    }

    fn describe(&self) -> String {
        "device".to_string()
    }
}

/// Run a command and return its output, logging the command line.
pub fn run(shell: &dyn ShellExecutor, command: &str) -> Result<ShellOutput, ShellError> {
    crate::log!(Topic::Shell, Debug, "{} $ {command}", shell.describe());

    let output = shell.execute(command)?;
    if log::__enabled(log::Level::Debug) && !output.stdout.is_empty() {
        crate::log!(Topic::Shell, Debug, "{}", output.stdout.trim_end());
    }

    Ok(output)
}

/// Streaming counterpart of [`run`].
pub fn run_streaming(
    shell: &dyn ShellExecutor,
    command: &str,
    timeout: Option<Duration>,
    on_line: &mut dyn FnMut(&str),
) -> Result<ShellOutput, ShellError> {
    crate::log!(Topic::Shell, Debug, "{} $ {command} (streaming)", shell.describe());

    shell.execute_streaming(command, timeout, on_line)
}

/// Run a command whose output must start with [`SUCCESS_MARKER`].
pub fn run_expect_success(
    shell: &dyn ShellExecutor,
    command: &str,
) -> Result<ShellOutput, ShellError> {
    let output = run(shell, command)?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(ShellError::CommandFailed {
            command: command.to_string(),
            output: output.combined(),
        })
    }
}

/// Quote a single argument for the device shell.
#[must_use]
pub fn quote(arg: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(arg))
}

///
/// TESTS
///
