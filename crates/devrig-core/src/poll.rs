//! Convergence helpers for eventually-consistent device state.
//!
//! Fixed interval, no backoff, no cancellation. A predicate that errors stops
//! the wait immediately; only `false` is retried.

use crate::{Error, ThisError, log::Topic};
use std::{
    thread,
    time::{Duration, Instant},
};

///
/// PollError
///
/// Both variants display as the caller's label so a test failure reads as the
/// condition that never held.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PollError {
    #[error("{label}")]
    Exhausted { label: String, attempts: u32 },

    #[error("{label}")]
    TimedOut { label: String, waited_ms: u128 },
}

impl PollError {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Exhausted { label, .. } | Self::TimedOut { label, .. } => label,
        }
    }
}

impl From<PollError> for Error {
    fn from(err: PollError) -> Self {
        Self::timeout(err.to_string())
    }
}

/// Re-evaluate `pred` every `interval` until it holds or `timeout` elapses.
///
/// The predicate runs at least once, even with a zero timeout.
pub fn wait_until<E, F>(label: &str, timeout: Duration, interval: Duration, mut pred: F) -> Result<(), E>
where
    E: From<PollError>,
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();
    loop {
        if pred()? {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            crate::log!(Topic::Poll, Warn, "gave up after {}ms: {label}", elapsed.as_millis());

            return Err(PollError::TimedOut {
                label: label.to_string(),
                waited_ms: elapsed.as_millis(),
            }
            .into());
        }

        thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Evaluate `pred` up to `attempts` times, sleeping `interval` between tries.
///
/// There is no sleep after the final attempt.
pub fn poll_attempts<E, F>(label: &str, attempts: u32, interval: Duration, mut pred: F) -> Result<(), E>
where
    E: From<PollError>,
    F: FnMut() -> Result<bool, E>,
{
    for attempt in 1..=attempts {
        if pred()? {
            return Ok(());
        }
        if attempt < attempts {
            thread::sleep(interval);
        }
    }

    crate::log!(Topic::Poll, Warn, "gave up after {attempts} attempts: {label}");

    Err(PollError::Exhausted {
        label: label.to_string(),
        attempts,
    }
    .into())
}

/// Run `op` once, then up to `retries` more times while it keeps failing.
///
/// `op` receives the zero-based attempt number. The last error is returned.
pub fn retry<T, E, F>(label: &str, retries: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries => {
                crate::log!(Topic::Poll, Debug, "{label}: attempt {} failed: {err}", attempt + 1);
                attempt += 1;
                thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

///
/// TESTS
///
