//! In-crate scripted shell for unit tests.
//!
//! Integration tests use the richer fakes in `devrig-testkit`; this one only
//! needs to answer prefixes with canned output.

use crate::{
    config::ConfigModel,
    device::Device,
    shell::{ShellError, ShellExecutor, ShellOutput},
};
use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Defaults with every wait shrunk to a few milliseconds.
pub fn fast_config() -> ConfigModel {
    let mut cfg = ConfigModel::default();
    cfg.boot.attempts = 3;
    cfg.boot.interval_ms = 1;
    cfg.poll.interval_ms = 1;
    cfg.timeouts.readiness_ms = 50;
    cfg.timeouts.result_ms = 200;
    cfg.timeouts.user_switch_ms = 20;
    cfg.timeouts.user_switch_settle_ms = 0;
    cfg.timeouts.lskf_capture_ms = 20;
    cfg.timeouts.shutdown_ms = 20;
    cfg.timeouts.online_ms = 20;

    cfg
}

pub fn device(shell: &Arc<ScriptShell>) -> Device {
    Device::new(shell.clone(), Arc::new(fast_config()))
}

type Reply = Result<ShellOutput, ShellError>;

struct Rule {
    prefix: String,
    replies: VecDeque<Reply>,
}

///
/// ScriptShell
///
/// The most recently registered matching prefix answers. A rule with several
/// replies hands them out in order and then keeps repeating the last one.
/// Unmatched commands answer with empty output.
///

#[derive(Default)]
pub struct ScriptShell {
    rules: Mutex<Vec<Rule>>,
    history: Mutex<Vec<String>>,
    pushed: Mutex<Vec<(String, String)>>,
}

impl ScriptShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, prefix: &str, stdout: &str) -> Self {
        self.sequence(prefix, &[stdout])
    }

    pub fn sequence(self, prefix: &str, outputs: &[&str]) -> Self {
        let replies = outputs
            .iter()
            .map(|out| Ok(ShellOutput::stdout(*out)))
            .collect();
        self.push_rule(prefix, replies)
    }

    pub fn fail(self, prefix: &str, err: ShellError) -> Self {
        self.push_rule(prefix, VecDeque::from([Err(err)]))
    }

    fn push_rule(self, prefix: &str, replies: VecDeque<Reply>) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                prefix: prefix.to_string(),
                replies,
            });
        self
    }

    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.history()
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .count()
    }

    pub fn pushed(&self) -> Vec<(String, String)> {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ShellExecutor for ScriptShell {
    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());

        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(rule) = rules
            .iter_mut()
            .rev()
            .find(|rule| command.starts_with(&rule.prefix))
        else {
            return Ok(ShellOutput::default());
        };

        if rule.replies.len() > 1 {
            rule.replies.pop_front().unwrap_or_else(|| Ok(ShellOutput::default()))
        } else {
            rule.replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(ShellOutput::default()))
        }
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), ShellError> {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((local.display().to_string(), remote.to_string()));

        Ok(())
    }

    fn wait_for_not_available(&self, _timeout: Duration) -> Result<(), ShellError> {
        Ok(())
    }

    fn wait_for_online(&self, _timeout: Duration) -> Result<(), ShellError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "script".to_string()
    }
}
