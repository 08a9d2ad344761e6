use crate::config::Config;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

///
/// Level
///

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug, // least severe
    Info,
    Ok,
    Warn,
    Error, // most severe
}

///
/// Topic
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[remain::sorted]
pub enum Topic {
    Boot,
    Config,
    Device,
    Dispatch,
    Fixture,
    Install,
    Instrument,
    Lock,
    Packages,
    Poll,
    Recovery,
    Settings,
    Shell,
    Users,
}

///
/// LogEntry
/// One retained log line, kept so failures can be triaged after the fact.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEntry {
    pub crate_name: String,
    pub topic: Option<String>,
    pub level: Level,
    pub message: String,
}

static LOG_BUFFER: Mutex<VecDeque<LogEntry>> = Mutex::new(VecDeque::new());

#[macro_export]
macro_rules! log {
    // =========================================
    // (1) With topic (normal + trailing comma)
    // =========================================
    ($topic:expr, $level:ident, $fmt:expr $(, $arg:expr)* $(,)?) => {{
        $crate::log!(@inner Some(&$topic.to_string()), $crate::log::Level::$level, $fmt $(, $arg)*);
    }};

    // =========================================
    // (2) No topic (normal + trailing comma)
    // =========================================
    ($level:ident, $fmt:expr $(, $arg:expr)* $(,)?) => {{
        $crate::log!(@inner None::<&str>, $crate::log::Level::$level, $fmt $(, $arg)*);
    }};

    // =========================================
    // INTERNAL
    // =========================================
    (@inner $topic:expr, $level:expr, $fmt:expr $(, $arg:expr)*) => {{
        let level = $level;
        let topic_opt: Option<&str> = $topic;
        let message = format!($fmt $(, $arg)*);

        // append entry
        let crate_name = env!("CARGO_PKG_NAME");
        $crate::log::__append_to_buffer(crate_name, topic_opt, level, &message);

        if $crate::log::__enabled(level) {
            let topic_disp = topic_opt.unwrap_or("...");
            let topic_centered = format!("{:^10}", topic_disp);

            let (color, reset) = match level {
                $crate::log::Level::Ok    => ("\x1b[32m", "\x1b[0m"),
                $crate::log::Level::Info  => ("\x1b[34m", "\x1b[0m"),
                $crate::log::Level::Warn  => ("\x1b[33m", "\x1b[0m"),
                $crate::log::Level::Error => ("\x1b[31m", "\x1b[0m"),
                $crate::log::Level::Debug => ("", ""),
            };

            let label = format!("{color}{:^5}{reset}", level.to_string().to_uppercase());
            eprintln!("{label}|{topic_centered}| {message}");
        }
    }};
}

/// Return up to `limit` of the most recently retained entries, oldest first.
#[must_use]
pub fn recent(limit: usize) -> Vec<LogEntry> {
    let buffer = LOG_BUFFER.lock().unwrap_or_else(PoisonError::into_inner);
    let skip = buffer.len().saturating_sub(limit);

    buffer.iter().skip(skip).cloned().collect()
}

/// Drop every retained entry.
pub fn clear() {
    LOG_BUFFER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

///
/// Helpers
///

#[doc(hidden)]
pub fn __append_to_buffer(crate_name: &str, topic: Option<&str>, level: Level, message: &str) {
    let max_entries = Config::get().log.max_entries;
    let mut buffer = LOG_BUFFER.lock().unwrap_or_else(PoisonError::into_inner);

    buffer.push_back(LogEntry {
        crate_name: crate_name.to_string(),
        topic: topic.map(ToString::to_string),
        level,
        message: message.to_string(),
    });
    while buffer.len() > max_entries {
        buffer.pop_front();
    }
}

#[doc(hidden)]
#[must_use]
pub fn __enabled(level: Level) -> bool {
    level >= Config::get().log.level
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Ok < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn logged_lines_are_retained_with_topic() {
        crate::log!(Topic::Install, Info, "staged {} files", 3);

        let found = recent(usize::MAX).into_iter().any(|entry| {
            entry.topic.as_deref() == Some("Install") && entry.message == "staged 3 files"
        });
        assert!(found, "log entry should be retained in the buffer");
    }
}
