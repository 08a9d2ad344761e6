use super::{DispatchError, RemoteError};
use crate::ids::PackageName;
use serde_json::Value;
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

#[derive(Default)]
struct State {
    ready: bool,
    outcome: Option<Result<Value, DispatchError>>,
}

///
/// Exchange
/// Shared slot between the delivering side and the waiting test.
///

#[derive(Default)]
pub(crate) struct Exchange {
    state: Mutex<State>,
    cond: Condvar,
}

impl Exchange {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_ready(&self) {
        self.lock().ready = true;
        self.cond.notify_all();
    }

    /// Store `outcome` unless something already resolved the exchange.
    pub(crate) fn resolve(&self, outcome: Result<Value, DispatchError>) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome);
        drop(state);
        self.cond.notify_all();

        true
    }
}

///
/// Responder
///
/// The delivering side's half of a pending result. `send` consumes it, so a
/// command can be answered at most once.
///

pub struct Responder {
    exchange: Arc<Exchange>,
}

impl Responder {
    pub(crate) const fn new(exchange: Arc<Exchange>) -> Self {
        Self { exchange }
    }

    /// Acknowledge that the remote side has received the command.
    pub fn ready(&self) {
        self.exchange.mark_ready();
    }

    /// Deliver the remote's answer.
    pub fn send(self, result: Result<Value, RemoteError>) {
        self.exchange.resolve(result.map_err(DispatchError::Remote));
    }

    /// Resolve with a delivery failure rather than a remote answer.
    pub fn fail(self, err: DispatchError) {
        self.exchange.resolve(Err(err));
    }
}

///
/// PendingResult
///
/// Single-use handle for one command's answer. Awaiting consumes it.
///

pub struct PendingResult {
    exchange: Arc<Exchange>,
    source: PackageName,
    action: String,
    timeout: Duration,
}

impl PendingResult {
    pub(crate) fn new(
        exchange: Arc<Exchange>,
        source: PackageName,
        action: String,
        timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            source,
            action,
            timeout,
        }
    }

    #[must_use]
    pub const fn source(&self) -> &PackageName {
        &self.source
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.exchange.lock().outcome.is_some()
    }

    /// Block for the answer up to the dispatcher's result timeout.
    pub fn await_result(self) -> Result<Value, DispatchError> {
        let timeout = self.timeout;
        self.await_timeout(timeout)
    }

    /// Block for the answer up to `timeout`.
    pub fn await_timeout(self, timeout: Duration) -> Result<Value, DispatchError> {
        let state = self.exchange.lock();
        let (mut state, _) = self
            .exchange
            .cond
            .wait_timeout_while(state, timeout, |s| s.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        state.outcome.take().unwrap_or_else(|| {
            Err(DispatchError::Timeout {
                package: self.source.to_string(),
                action: self.action.clone(),
                timeout_ms: timeout.as_millis(),
            })
        })
    }

    /// Wait for the readiness acknowledgement. An early outcome also ends the
    /// wait; the caller sees it when awaiting the result.
    pub(crate) fn wait_ready(&self, timeout: Duration) -> Result<(), DispatchError> {
        let state = self.exchange.lock();
        let (state, _) = self
            .exchange
            .cond
            .wait_timeout_while(state, timeout, |s| !s.ready && s.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        if state.ready || state.outcome.is_some() {
            Ok(())
        } else {
            Err(DispatchError::ReadinessTimeout {
                package: self.source.to_string(),
                timeout_ms: timeout.as_millis(),
            })
        }
    }
}

///
/// TESTS
///
