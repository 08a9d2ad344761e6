use devrig_core::dispatch::{Command, DispatchError, RemoteError, Responder, Transport};
use serde_json::Value;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

#[derive(Clone)]
enum Behavior {
    Answer(Result<Value, RemoteError>),
    Silent,
    ReadyOnly,
    Deferred,
    Refuse(String),
}

#[derive(Default)]
struct State {
    behaviors: BTreeMap<String, Behavior>,
    received: Vec<Command>,
    deferred: VecDeque<Responder>,
    held: Vec<Responder>,
}

///
/// FakeCompanion
///
/// Loopback transport standing in for an app on the device. Each action is
/// answered according to what the test registered for it; unknown actions get
/// a `MissingBroadcastException`.
///

#[derive(Default)]
pub struct FakeCompanion {
    state: Mutex<State>,
}

impl FakeCompanion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge and answer `action` immediately.
    #[must_use]
    pub fn on(self, action: &str, answer: Result<Value, RemoteError>) -> Self {
        self.set(action, Behavior::Answer(answer))
    }

    /// Never acknowledge nor answer `action`.
    #[must_use]
    pub fn on_silent(self, action: &str) -> Self {
        self.set(action, Behavior::Silent)
    }

    /// Acknowledge `action` but never answer it.
    #[must_use]
    pub fn on_ready_only(self, action: &str) -> Self {
        self.set(action, Behavior::ReadyOnly)
    }

    /// Acknowledge `action` and hold the answer until [`Self::complete_next`].
    #[must_use]
    pub fn on_deferred(self, action: &str) -> Self {
        self.set(action, Behavior::Deferred)
    }

    /// Fail delivery of `action` as if the transport broke.
    #[must_use]
    pub fn on_refused(self, action: &str, reason: &str) -> Self {
        self.set(action, Behavior::Refuse(reason.to_string()))
    }

    /// Answer the oldest deferred command. Returns false if none was waiting.
    pub fn complete_next(&self, answer: Result<Value, RemoteError>) -> bool {
        let responder = self.lock().deferred.pop_front();

        responder.is_some_and(|r| {
            r.send(answer);
            true
        })
    }

    #[must_use]
    pub fn deferred(&self) -> usize {
        self.lock().deferred.len()
    }

    /// Commands delivered so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<Command> {
        self.lock().received.clone()
    }

    fn set(self, action: &str, behavior: Behavior) -> Self {
        self.lock().behaviors.insert(action.to_string(), behavior);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for FakeCompanion {
    fn deliver(&self, command: &Command, responder: Responder) -> Result<(), DispatchError> {
        let mut state = self.lock();
        state.received.push(command.clone());

        let behavior = state.behaviors.get(&command.action).cloned().unwrap_or_else(|| {
            Behavior::Answer(Err(RemoteError::new(
                RemoteError::MISSING_BROADCAST,
                format!("no handler for {}", command.action),
            )))
        });

        match behavior {
            Behavior::Answer(answer) => {
                responder.ready();
                responder.send(answer);
            }
            // keep the responder alive so the result stays pending
            Behavior::Silent => state.held.push(responder),
            Behavior::ReadyOnly => {
                responder.ready();
                state.held.push(responder);
            }
            Behavior::Deferred => {
                responder.ready();
                state.deferred.push_back(responder);
            }
            Behavior::Refuse(reason) => return Err(DispatchError::Transport(reason)),
        }

        Ok(())
    }
}
