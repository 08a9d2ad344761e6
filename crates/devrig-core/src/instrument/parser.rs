//! Parser for the raw (`-r`) output of `am instrument`.

use derive_more::Display;
use std::collections::BTreeMap;

const STATUS: &str = "INSTRUMENTATION_STATUS: ";
const STATUS_CODE: &str = "INSTRUMENTATION_STATUS_CODE: ";
const RESULT: &str = "INSTRUMENTATION_RESULT: ";
const CODE: &str = "INSTRUMENTATION_CODE: ";
const FAILED: &str = "INSTRUMENTATION_FAILED: ";
const ABORTED: &str = "INSTRUMENTATION_ABORTED: ";

///
/// TestStatus
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum TestStatus {
    /// Started and never reported back, usually because the process died.
    #[display("incomplete")]
    Started,

    #[display("passed")]
    Passed,

    #[display("failed")]
    Failed,

    #[display("error")]
    Errored,

    #[display("ignored")]
    Ignored,

    #[display("assumption failed")]
    AssumptionFailed,
}

impl TestStatus {
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Started),
            0 => Some(Self::Passed),
            -1 => Some(Self::Errored),
            -2 => Some(Self::Failed),
            -3 => Some(Self::Ignored),
            -4 => Some(Self::AssumptionFailed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Started | Self::Failed | Self::Errored)
    }
}

///
/// TestResult
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestResult {
    pub class: String,
    pub method: String,
    pub status: TestStatus,
    pub stack: Option<String>,
}

impl TestResult {
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}#{}", self.class, self.method)
    }
}

///
/// InstrumentationReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstrumentationReport {
    pub results: Vec<TestResult>,
    pub run_failure: Option<String>,
    pub code: Option<i32>,
}

impl InstrumentationReport {
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.status.is_failure())
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == TestStatus::Passed)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Section {
    None,
    Status,
    Result,
}

///
/// parse
/// Values may span several lines; a line without a known prefix continues
/// the value before it.
///

#[must_use]
pub fn parse(output: &str) -> InstrumentationReport {
    let mut report = InstrumentationReport::default();
    let mut bundle: BTreeMap<String, String> = BTreeMap::new();
    let mut result_bundle: BTreeMap<String, String> = BTreeMap::new();
    let mut last_key: Option<String> = None;
    let mut section = Section::None;

    for line in output.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(kv) = line.strip_prefix(STATUS) {
            last_key = insert_pair(&mut bundle, kv);
            section = Section::Status;
        } else if let Some(code) = line.strip_prefix(STATUS_CODE) {
            if let Ok(code) = code.trim().parse() {
                record_status(&mut report, &bundle, code);
            }
            bundle.clear();
            last_key = None;
            section = Section::None;
        } else if let Some(kv) = line.strip_prefix(RESULT) {
            last_key = insert_pair(&mut result_bundle, kv);
            section = Section::Result;
        } else if let Some(code) = line.strip_prefix(CODE) {
            report.code = code.trim().parse().ok();
            section = Section::None;
        } else if let Some(msg) = line
            .strip_prefix(FAILED)
            .or_else(|| line.strip_prefix(ABORTED))
        {
            report.run_failure.get_or_insert_with(|| msg.trim().to_string());
            section = Section::None;
        } else if let Some(key) = &last_key {
            let target = match section {
                Section::Status => &mut bundle,
                Section::Result => &mut result_bundle,
                Section::None => continue,
            };
            if let Some(value) = target.get_mut(key) {
                value.push('\n');
                value.push_str(line);
            }
        }
    }

    if let Some(msg) = result_bundle.get("shortMsg") {
        report.run_failure.get_or_insert_with(|| msg.trim().to_string());
    }

    report
}

fn insert_pair(bundle: &mut BTreeMap<String, String>, kv: &str) -> Option<String> {
    let (key, value) = kv.split_once('=')?;
    bundle.insert(key.to_string(), value.to_string());

    Some(key.to_string())
}

fn record_status(report: &mut InstrumentationReport, bundle: &BTreeMap<String, String>, code: i32) {
    let Some(status) = TestStatus::from_code(code) else {
        return;
    };
    let (Some(class), Some(method)) = (bundle.get("class"), bundle.get("test")) else {
        return;
    };
    let stack = bundle
        .get("stack")
        .map(|s| s.trim_end().to_string())
        .filter(|s| !s.is_empty());

    // a completion replaces the matching start entry
    if status != TestStatus::Started
        && let Some(open) = report.results.iter_mut().rev().find(|r| {
            r.status == TestStatus::Started && &r.class == class && &r.method == method
        })
    {
        open.status = status;
        open.stack = stack;
        return;
    }

    report.results.push(TestResult {
        class: class.clone(),
        method: method.clone(),
        status,
        stack,
    });
}

///
/// TESTS
///
