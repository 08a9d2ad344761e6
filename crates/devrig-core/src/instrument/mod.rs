//! On-device test runs through `am instrument`.

mod parser;

pub use parser::{InstrumentationReport, TestResult, TestStatus, parse};

use crate::{
    Error, ThisError,
    device::Device,
    ids::{PackageName, UserId},
    log::Topic,
    shell::{self, ShellError, quote},
};
use std::time::Duration;

///
/// InstrumentationError
///

#[derive(Debug, ThisError)]
pub enum InstrumentationError {
    #[error("no tests were run for {package}")]
    NoTestsRun { package: String },

    #[error("instrumentation of {package} failed: {message}")]
    RunFailed { package: String, message: String },

    #[error("{count} test(s) failed in {package}:\n{summary}")]
    TestsFailed {
        package: String,
        count: usize,
        summary: String,
    },
}

impl From<InstrumentationError> for Error {
    fn from(err: InstrumentationError) -> Self {
        Self::assertion(err.to_string())
    }
}

impl InstrumentationReport {
    /// Require a clean run with at least one test and no failing test.
    pub fn ensure_passed(&self, package: &PackageName) -> Result<(), InstrumentationError> {
        let failures: Vec<_> = self.failures().collect();

        if !failures.is_empty() {
            let summary = failures
                .iter()
                .map(|r| match &r.stack {
                    Some(stack) => format!("{} ({}):\n{stack}", r.name(), r.status),
                    None => format!("{} ({})", r.name(), r.status),
                })
                .collect::<Vec<_>>()
                .join("\n");

            return Err(InstrumentationError::TestsFailed {
                package: package.to_string(),
                count: failures.len(),
                summary,
            });
        }
        if let Some(message) = &self.run_failure {
            return Err(InstrumentationError::RunFailed {
                package: package.to_string(),
                message: message.clone(),
            });
        }
        if self.is_empty() {
            return Err(InstrumentationError::NoTestsRun {
                package: package.to_string(),
            });
        }

        Ok(())
    }
}

///
/// InstrumentationRun
///
/// Builder for one `am instrument -w -r` invocation. A class starting with
/// `.` is resolved against the test package.
///

#[derive(Clone, Debug)]
pub struct InstrumentationRun {
    package: PackageName,
    runner: String,
    class: Option<String>,
    method: Option<String>,
    user: Option<UserId>,
    args: Vec<(String, String)>,
    hidden_api_checks: bool,
    timeout: Option<Duration>,
}

impl InstrumentationRun {
    pub fn new(package: PackageName, runner: impl Into<String>) -> Self {
        Self {
            package,
            runner: runner.into(),
            class: None,
            method: None,
            user: None,
            args: Vec::new(),
            hidden_api_checks: true,
            timeout: None,
        }
    }

    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        self.class = Some(if class.starts_with('.') {
            format!("{}{class}", self.package)
        } else {
            class
        });
        self
    }

    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub const fn user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// Extra `-e key value` instrumentation argument.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn without_hidden_api_checks(mut self) -> Self {
        self.hidden_api_checks = false;
        self
    }

    /// Bound for the whole run; defaults to `timeouts.instrumentation_ms`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn command(&self) -> String {
        let mut cmd = String::from("am instrument -w -r");

        if !self.hidden_api_checks {
            cmd.push_str(" --no-hidden-api-checks");
        }
        if let Some(user) = self.user {
            cmd.push_str(&format!(" --user {user}"));
        }
        if let Some(class) = &self.class {
            let target = match &self.method {
                Some(method) => format!("{class}#{method}"),
                None => class.clone(),
            };
            cmd.push_str(&format!(" -e class {}", quote(&target)));
        }
        for (key, value) in &self.args {
            cmd.push_str(&format!(" -e {} {}", quote(key), quote(value)));
        }
        cmd.push_str(&format!(" {}/{}", self.package, self.runner));

        cmd
    }

    /// Run and parse; test failures are in the report, not the error.
    ///
    /// A run that outlives its bound is parsed from the status lines seen so
    /// far and carries the timeout as its run failure.
    pub fn run(&self, device: &Device) -> Result<InstrumentationReport, Error> {
        let timeout = self
            .timeout
            .unwrap_or_else(|| device.config().timeouts.instrumentation());
        crate::log!(Topic::Instrument, Info, "running {}", self.describe());

        let mut streamed = String::new();
        let result = shell::run_streaming(
            &**device.shell(),
            &self.command(),
            Some(timeout),
            &mut |line| {
                streamed.push_str(line);
                streamed.push('\n');
            },
        );

        let report = match result {
            Ok(output) => parse(&output.stdout),
            Err(ShellError::Timeout { timeout_ms, .. }) => {
                crate::log!(
                    Topic::Instrument,
                    Warn,
                    "{} timed out after {timeout_ms}ms",
                    self.describe()
                );
                let mut report = parse(&streamed);
                report
                    .run_failure
                    .get_or_insert_with(|| format!("timed out after {timeout_ms}ms"));
                report
            }
            Err(err) => return Err(err.into()),
        };

        crate::log!(
            Topic::Instrument,
            Info,
            "{}: {} passed, {} failed",
            self.package,
            report.passed(),
            report.failures().count()
        );

        Ok(report)
    }

    /// Run and require every test to pass.
    pub fn run_checked(&self, device: &Device) -> Result<InstrumentationReport, Error> {
        let report = self.run(device)?;
        report.ensure_passed(&self.package)?;

        Ok(report)
    }

    fn describe(&self) -> String {
        match (&self.class, &self.method) {
            (Some(c), Some(m)) => format!("{c}#{m}"),
            (Some(c), None) => c.clone(),
            _ => self.package.to_string(),
        }
    }
}

impl Device {
    /// An instrumentation run of `package` with the configured runner.
    #[must_use]
    pub fn instrumentation(&self, package: &PackageName) -> InstrumentationRun {
        InstrumentationRun::new(
            package.clone(),
            self.config().device.instrumentation_runner.clone(),
        )
    }

    /// Run `class` (and optionally one `method`) and fail unless every test passed.
    pub fn run_device_tests(
        &self,
        package: &PackageName,
        class: &str,
        method: Option<&str>,
    ) -> Result<InstrumentationReport, Error> {
        let mut run = self.instrumentation(package).class(class);
        if let Some(method) = method {
            run = run.method(method);
        }

        run.run_checked(self)
    }

    pub fn run_device_tests_as_user(
        &self,
        package: &PackageName,
        class: &str,
        method: Option<&str>,
        user: UserId,
    ) -> Result<InstrumentationReport, Error> {
        let mut run = self.instrumentation(package).class(class).user(user);
        if let Some(method) = method {
            run = run.method(method);
        }

        run.run_checked(self)
    }
}

///
/// TESTS
///
