use super::DispatchError;
use crate::log::Topic;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

type Job = Box<dyn FnOnce() + Send + 'static>;

///
/// Looper
///
/// Long-lived worker thread with its own run loop. Deliveries run here so the
/// test thread is free to block on readiness and results.
///

pub struct Looper {
    name: String,
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Looper {
    pub fn spawn(name: impl Into<String>) -> Result<Self, DispatchError> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        crate::log!(Topic::Dispatch, Error, "{thread_name}: delivery panicked");
                    }
                }
            })
            .map_err(|e| DispatchError::Looper(format!("cannot start {name}: {e}")))?;

        Ok(Self {
            name,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job` behind any deliveries already posted.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<(), DispatchError> {
        self.sender
            .as_ref()
            .ok_or_else(|| DispatchError::Looper(format!("{} is shut down", self.name)))?
            .send(Box::new(job))
            .map_err(|_| DispatchError::Looper(format!("{} has exited", self.name)))
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        // closing the channel ends the run loop once queued jobs drain
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            crate::log!(Topic::Dispatch, Warn, "{} exited abnormally", self.name);
        }
    }
}

///
/// TESTS
///
