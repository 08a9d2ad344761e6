use super::{Command, DispatchError, RemoteError, Responder};
use crate::{
    log::Topic,
    shell::{self, ShellExecutor, quote},
};
use serde_json::Value;
use std::{sync::Arc, thread, time::Duration};

/// Extra carrying the target package name.
pub const EXTRA_TARGET_PACKAGE: &str = "devrig.extra.TARGET_PACKAGE";
/// Extra carrying the target uid.
pub const EXTRA_TARGET_UID: &str = "devrig.extra.TARGET_UID";
/// Extra carrying the JSON payload.
pub const EXTRA_PAYLOAD: &str = "devrig.extra.PAYLOAD";

/// Activity.RESULT_OK as reported by `am broadcast`.
pub const RESULT_OK: i32 = -1;

const BROADCASTING: &str = "Broadcasting: Intent";
const COMPLETED: &str = "Broadcast completed: result=";

///
/// Transport
///
/// Delivers a command into the target process. Runs on the dispatcher's
/// looper; it may signal readiness and answer through the responder from
/// any thread, at any later time. Waiting for the answer here would hold up
/// every command queued behind this one.
///

pub trait Transport: Send + Sync {
    fn deliver(&self, command: &Command, responder: Responder) -> Result<(), DispatchError>;
}

///
/// ShellBroadcastTransport
///
/// Sends each command as an ordered broadcast to the companion app's
/// receiver and decodes the result code and data the receiver set.
///
/// `am broadcast` prints `Broadcasting: Intent` as soon as the intent is out
/// and only returns once the receiver has finished, so each delivery runs on
/// its own thread and acknowledges readiness from the streamed output.
///

pub struct ShellBroadcastTransport {
    shell: Arc<dyn ShellExecutor>,
    receiver: String,
    timeout: Option<Duration>,
}

impl ShellBroadcastTransport {
    pub fn new(shell: Arc<dyn ShellExecutor>, receiver: impl Into<String>) -> Self {
        Self {
            shell,
            receiver: receiver.into(),
            timeout: None,
        }
    }

    /// Bound a whole broadcast, receiver included. Defaults to the executor's
    /// own command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The `am broadcast` line for `command`.
    pub fn broadcast_command(&self, command: &Command) -> Result<String, DispatchError> {
        let mut line = format!(
            "am broadcast -a {} -n {}/{}",
            quote(&command.action),
            command.source,
            quote(&self.receiver)
        );
        if let Some(target) = &command.target {
            line.push_str(&format!(" --es {EXTRA_TARGET_PACKAGE} {target}"));
        }
        if let Some(uid) = command.target_uid {
            line.push_str(&format!(" --ei {EXTRA_TARGET_UID} {uid}"));
        }
        if !command.payload.is_empty() {
            let json = serde_json::to_string(&command.payload)
                .map_err(|e| DispatchError::Transport(format!("cannot encode payload: {e}")))?;
            line.push_str(&format!(" --es {EXTRA_PAYLOAD} {}", quote(&json)));
        }

        Ok(line)
    }
}

impl Transport for ShellBroadcastTransport {
    fn deliver(&self, command: &Command, responder: Responder) -> Result<(), DispatchError> {
        let line = self.broadcast_command(command)?;
        let shell = self.shell.clone();
        let timeout = self.timeout;
        let label = command.to_string();

        thread::Builder::new()
            .name("devrig-broadcast".to_string())
            .spawn(move || {
                let output = shell::run_streaming(&*shell, &line, timeout, &mut |out| {
                    if out.contains(BROADCASTING) {
                        responder.ready();
                    }
                });

                let answer = output
                    .map_err(|e| DispatchError::Transport(e.to_string()))
                    .and_then(|output| parse_broadcast_result(&output.stdout));
                match answer {
                    Ok(answer) => {
                        crate::log!(Topic::Dispatch, Debug, "{label}: answered");
                        responder.send(answer);
                    }
                    Err(err) => {
                        crate::log!(Topic::Dispatch, Warn, "{label}: {err}");
                        responder.fail(err);
                    }
                }
            })
            .map_err(|e| DispatchError::Transport(format!("cannot start delivery: {e}")))?;

        Ok(())
    }
}

/// Decode `Broadcast completed: result=<code>, data="<json>"`.
pub fn parse_broadcast_result(output: &str) -> Result<Result<Value, RemoteError>, DispatchError> {
    let line = output
        .lines()
        .find_map(|l| l.trim().strip_prefix(COMPLETED))
        .ok_or_else(|| DispatchError::MalformedResponse(output.trim().to_string()))?;

    let (code, rest) = line.split_once(',').unwrap_or((line, ""));
    let code: i32 = code
        .trim()
        .parse()
        .map_err(|_| DispatchError::MalformedResponse(line.to_string()))?;
    let data = extract_data(rest);

    if code == RESULT_OK {
        return match data {
            Some(raw) => serde_json::from_str(raw)
                .map(Ok)
                .map_err(|e| DispatchError::MalformedResponse(format!("{e}: {raw}"))),
            None => Ok(Ok(Value::Null)),
        };
    }

    let remote = data
        .and_then(|raw| serde_json::from_str::<RemoteError>(raw).ok())
        .unwrap_or_else(|| {
            RemoteError::new(
                "RemoteException",
                format!("result={code} data={}", data.unwrap_or("")),
            )
        });

    Ok(Err(remote))
}

// the data string is printed unescaped, possibly followed by `, extras: ...`
fn extract_data(rest: &str) -> Option<&str> {
    let start = rest.find("data=\"")? + "data=\"".len();
    let tail = &rest[start..];
    let tail = tail.rsplit_once("\", extras:").map_or(tail, |(data, _)| data);

    Some(tail.trim_end().strip_suffix('"').unwrap_or(tail))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::Dispatcher,
        ids::PackageName,
        shell::{ShellError, ShellOutput},
        test::ScriptShell,
    };
    use serde_json::json;
    use std::sync::{Condvar, Mutex};

    // Holds back the completion line of matching broadcasts until opened,
    // like a receiver still waiting for its callback.
    struct HeldReceiverShell {
        held_action: &'static str,
        open: Mutex<bool>,
        cond: Condvar,
    }

    impl HeldReceiverShell {
        fn new(held_action: &'static str) -> Self {
            Self {
                held_action,
                open: Mutex::new(false),
                cond: Condvar::new(),
            }
        }

        fn release(&self) {
            *self.open.lock().unwrap() = true;
            self.cond.notify_all();
        }
    }

    impl ShellExecutor for HeldReceiverShell {
        fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
            self.execute_streaming(command, None, &mut |_| {})
        }

        fn execute_streaming(
            &self,
            command: &str,
            _timeout: Option<Duration>,
            on_line: &mut dyn FnMut(&str),
        ) -> Result<ShellOutput, ShellError> {
            let intent = "Broadcasting: Intent { flg=0x400000 }";
            on_line(intent);

            let data = if command.contains(self.held_action) {
                let open = self.open.lock().unwrap();
                drop(
                    self.cond
                        .wait_timeout_while(open, Duration::from_secs(5), |open| !*open)
                        .unwrap(),
                );
                "{\"package\":\"com.example.added\"}"
            } else {
                "\"pong\""
            };

            let done = format!("Broadcast completed: result=-1, data=\"{data}\"");
            on_line(&done);

            Ok(ShellOutput::stdout(format!("{intent}\n{done}\n")))
        }
    }

    fn broadcast_dispatcher(shell: Arc<dyn ShellExecutor>) -> Dispatcher {
        let transport = ShellBroadcastTransport::new(shell, ".CommandReceiver");

        Dispatcher::with_timeouts(
            Arc::new(transport),
            Duration::from_millis(500),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn queries() -> PackageName {
        PackageName::new("com.example.queries").unwrap()
    }

    #[test]
    fn readiness_is_acknowledged_while_the_receiver_waits() {
        let shell = Arc::new(HeldReceiverShell::new("AWAIT_PACKAGE_ADDED"));
        let dispatcher = broadcast_dispatcher(shell.clone());

        let pending = dispatcher
            .send_command(&queries(), None, None, "AWAIT_PACKAGE_ADDED", true)
            .unwrap();
        assert!(!pending.is_resolved());

        shell.release();
        assert_eq!(
            pending.await_result().unwrap(),
            json!({ "package": "com.example.added" })
        );
    }

    #[test]
    fn held_broadcast_does_not_delay_later_commands() {
        let shell = Arc::new(HeldReceiverShell::new("AWAIT_PACKAGE_ADDED"));
        let dispatcher = broadcast_dispatcher(shell.clone());

        let held = dispatcher
            .send_command(&queries(), None, None, "AWAIT_PACKAGE_ADDED", true)
            .unwrap();
        let ping = dispatcher
            .send_command(&queries(), None, None, "PING", false)
            .unwrap()
            .await_timeout(Duration::from_secs(1))
            .unwrap();

        assert_eq!(ping, json!("pong"));
        assert!(!held.is_resolved());

        shell.release();
        held.await_result().unwrap();
    }

    #[test]
    fn shell_failure_resolves_the_pending_result() {
        let shell = Arc::new(ScriptShell::new().fail(
            "am broadcast",
            ShellError::DeviceNotAvailable("error: device offline".into()),
        ));
        let dispatcher = broadcast_dispatcher(shell);

        let err = dispatcher
            .send_command_blocking(&queries(), None, None, "PING")
            .unwrap_err();

        assert!(matches!(err, DispatchError::Transport(ref msg) if msg.contains("device offline")));
    }

    #[test]
    fn broadcast_command_carries_target_and_payload() {
        let transport = ShellBroadcastTransport::new(
            Arc::new(crate::test::ScriptShell::new()),
            ".CommandReceiver",
        );
        let cmd = Command::new(PackageName::new("com.example.queries").unwrap(), "GET_INFO")
            .with_target(PackageName::new("com.example.target").unwrap())
            .with_target_uid(10_123)
            .with_extra("flags", 1);

        assert_eq!(
            transport.broadcast_command(&cmd).unwrap(),
            "am broadcast -a GET_INFO -n com.example.queries/.CommandReceiver \
             --es devrig.extra.TARGET_PACKAGE com.example.target \
             --ei devrig.extra.TARGET_UID 10123 \
             --es devrig.extra.PAYLOAD '{\"flags\":1}'"
        );
    }

    #[test]
    fn ok_result_yields_payload() {
        let out = "Broadcasting: Intent { act=X flg=0x400000 }\n\
                   Broadcast completed: result=-1, data=\"{\"installed\":[\"a.b\"]}\"\n";

        let answer = parse_broadcast_result(out).unwrap().unwrap();
        assert_eq!(answer, json!({ "installed": ["a.b"] }));
    }

    #[test]
    fn ok_result_without_data_is_null() {
        let answer = parse_broadcast_result("Broadcast completed: result=-1\n")
            .unwrap()
            .unwrap();
        assert_eq!(answer, Value::Null);
    }

    #[test]
    fn data_is_cut_before_extras() {
        let out = "Broadcast completed: result=-1, data=\"true\", extras: Bundle[{x=1}]";

        assert_eq!(parse_broadcast_result(out).unwrap().unwrap(), json!(true));
    }

    #[test]
    fn error_result_decodes_remote_error() {
        let out = "Broadcast completed: result=1, \
                   data=\"{\"kind\":\"MissingBroadcastException\",\"message\":\"none\"}\"";

        let remote = parse_broadcast_result(out).unwrap().unwrap_err();
        assert!(remote.is_missing_broadcast());
        assert_eq!(remote.message, "none");
    }

    #[test]
    fn error_result_with_opaque_data_keeps_it() {
        let remote = parse_broadcast_result("Broadcast completed: result=0")
            .unwrap()
            .unwrap_err();
        assert_eq!(remote.kind, "RemoteException");
        assert_eq!(remote.message, "result=0 data=");
    }

    #[test]
    fn missing_completion_line_is_malformed() {
        let err = parse_broadcast_result("Error: Bad component name").unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse(_)));
    }
}
