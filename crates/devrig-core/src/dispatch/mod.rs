//! Command dispatch to companion apps.
//!
//! A test asks an installed app to do something on its behalf and blocks on
//! the structured answer. The dispatcher hands each command to a transport on
//! its looper thread, optionally waits for the readiness acknowledgement, and
//! returns a [`PendingResult`] the test awaits exactly once.

mod command;
mod future;
mod looper;
mod transport;

pub use command::{Command, RemoteError};
pub use future::{PendingResult, Responder};
pub use looper::Looper;
pub use transport::{
    EXTRA_PAYLOAD, EXTRA_TARGET_PACKAGE, EXTRA_TARGET_UID, RESULT_OK, ShellBroadcastTransport,
    Transport, parse_broadcast_result,
};

use crate::{Error, ThisError, config::ConfigModel, ids::PackageName, log::Topic};
use future::Exchange;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};

///
/// DispatchError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DispatchError {
    #[error("dispatch looper failure: {0}")]
    Looper(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{package} did not acknowledge the command within {timeout_ms}ms")]
    ReadinessTimeout { package: String, timeout_ms: u128 },

    #[error("{0}")]
    Remote(RemoteError),

    #[error("no result from {package} for {action} within {timeout_ms}ms")]
    Timeout {
        package: String,
        action: String,
        timeout_ms: u128,
    },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl DispatchError {
    #[must_use]
    pub const fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_missing_broadcast(&self) -> bool {
        self.remote().is_some_and(RemoteError::is_missing_broadcast)
    }
}

impl From<DispatchError> for Error {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ReadinessTimeout { .. } | DispatchError::Timeout { .. } => {
                Self::timeout(err.to_string())
            }
            DispatchError::Remote(_) => Self::remote(err.to_string()),
            DispatchError::Looper(_) => Self::harness(err.to_string()),
            DispatchError::MalformedResponse(_) | DispatchError::Transport(_) => {
                Self::shell(err.to_string())
            }
        }
    }
}

///
/// Dispatcher
///

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    looper: Looper,
    readiness_timeout: Duration,
    result_timeout: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: &ConfigModel) -> Result<Self, DispatchError> {
        Self::with_timeouts(
            transport,
            config.timeouts.readiness(),
            config.timeouts.result(),
        )
    }

    pub fn with_timeouts(
        transport: Arc<dyn Transport>,
        readiness_timeout: Duration,
        result_timeout: Duration,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            transport,
            looper: Looper::spawn("devrig-dispatch")?,
            readiness_timeout,
            result_timeout,
        })
    }

    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    #[must_use]
    pub const fn result_timeout(&self) -> Duration {
        self.result_timeout
    }

    /// Address `action` from `source`, optionally about `target`.
    pub fn send_command(
        &self,
        source: &PackageName,
        target: Option<&PackageName>,
        payload: Option<Map<String, Value>>,
        action: &str,
        wait_for_ready: bool,
    ) -> Result<PendingResult, DispatchError> {
        let mut command = Command::new(source.clone(), action);
        if let Some(target) = target {
            command = command.with_target(target.clone());
        }
        if let Some(payload) = payload {
            command = command.with_payload(payload);
        }

        self.send(command, wait_for_ready)
    }

    /// Queue `command` for delivery and hand back its pending result.
    ///
    /// With `wait_for_ready` the call blocks until the remote acknowledges the
    /// command or the readiness timeout expires.
    pub fn send(&self, command: Command, wait_for_ready: bool) -> Result<PendingResult, DispatchError> {
        crate::log!(Topic::Dispatch, Info, "send {command}");

        let exchange = Arc::new(Exchange::default());
        let pending = PendingResult::new(
            exchange.clone(),
            command.source.clone(),
            command.action.clone(),
            self.result_timeout,
        );

        let transport = self.transport.clone();
        let responder = Responder::new(exchange.clone());
        self.looper.post(move || {
            if let Err(err) = transport.deliver(&command, responder) {
                crate::log!(Topic::Dispatch, Warn, "delivery of {command} failed: {err}");
                exchange.resolve(Err(err));
            }
        })?;

        if wait_for_ready {
            pending.wait_ready(self.readiness_timeout)?;
        }

        Ok(pending)
    }

    /// Send without a readiness wait and block for the answer.
    pub fn send_command_blocking(
        &self,
        source: &PackageName,
        target: Option<&PackageName>,
        payload: Option<Map<String, Value>>,
        action: &str,
    ) -> Result<Value, DispatchError> {
        self.send_command(source, target, payload, action, false)?
            .await_result()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    type Script = dyn Fn(&Command, Responder) -> Result<(), DispatchError> + Send + Sync;

    struct FnTransport(Box<Script>);

    impl Transport for FnTransport {
        fn deliver(&self, command: &Command, responder: Responder) -> Result<(), DispatchError> {
            (self.0)(command, responder)
        }
    }

    fn dispatcher(script: Box<Script>) -> Dispatcher {
        Dispatcher::with_timeouts(
            Arc::new(FnTransport(script)),
            Duration::from_millis(50),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    fn source() -> PackageName {
        PackageName::new("com.example.queries").unwrap()
    }

    #[test]
    fn blocking_send_echoes_payload() {
        let d = dispatcher(Box::new(|cmd, responder| {
            responder.send(Ok(Value::Object(cmd.payload.clone())));
            Ok(())
        }));

        let mut payload = Map::new();
        payload.insert("flags".into(), json!(4));
        let value = d
            .send_command_blocking(&source(), None, Some(payload), "ECHO")
            .unwrap();

        assert_eq!(value, json!({ "flags": 4 }));
    }

    #[test]
    fn ready_wait_returns_before_the_answer() {
        let parked: Arc<Mutex<Option<Responder>>> = Arc::default();
        let slot = parked.clone();
        let d = dispatcher(Box::new(move |_, responder| {
            let mut parked = slot.lock().unwrap();
            responder.ready();
            *parked = Some(responder);
            Ok(())
        }));

        let pending = d.send_command(&source(), None, None, "AWAIT_CALLBACK", true).unwrap();
        assert!(!pending.is_resolved());

        parked.lock().unwrap().take().unwrap().send(Ok(json!("done")));
        assert_eq!(pending.await_result().unwrap(), json!("done"));
    }

    #[test]
    fn silent_remote_fails_readiness() {
        let d = dispatcher(Box::new(|_, responder| {
            drop(responder);
            Ok(())
        }));

        let err = d
            .send_command(&source(), None, None, "AWAIT_CALLBACK", true)
            .err()
            .unwrap();

        assert!(matches!(err, DispatchError::ReadinessTimeout { ref package, .. } if package == "com.example.queries"));
    }

    #[test]
    fn transport_failure_resolves_the_result() {
        let d = dispatcher(Box::new(|_, _| {
            Err(DispatchError::Transport("adb went away".into()))
        }));

        let pending = d.send_command(&source(), None, None, "X", true).unwrap();
        let err = pending.await_result().unwrap_err();

        assert_eq!(err, DispatchError::Transport("adb went away".into()));
    }

    #[test]
    fn unanswered_command_times_out() {
        let d = dispatcher(Box::new(|_, _| Ok(())));

        let err = d
            .send_command_blocking(&source(), None, None, "NEVER")
            .unwrap_err();
        let err: Error = err.into();

        assert!(err.is_timeout());
        assert!(err.message.contains("com.example.queries"));
    }
}
