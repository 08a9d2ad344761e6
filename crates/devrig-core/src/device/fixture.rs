use super::Device;
use crate::{Error, log::Topic};
use std::ops::Deref;

type Cleanup = Box<dyn FnOnce(&Device) -> Result<(), Error> + Send>;

enum Entry {
    Run(Cleanup),
    Hold(Box<dyn Send>),
}

///
/// DeviceFixture
///
/// A device plus the cleanups a test registered against it. Cleanups run in
/// reverse order of registration, once, either from `teardown` or on drop.
///

pub struct DeviceFixture {
    device: Device,
    stack: Vec<(String, Entry)>,
}

impl DeviceFixture {
    #[must_use]
    pub const fn new(device: Device) -> Self {
        Self {
            device,
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Register a cleanup closure.
    pub fn defer<F>(&mut self, label: impl Into<String>, f: F)
    where
        F: FnOnce(&Device) -> Result<(), Error> + Send + 'static,
    {
        self.stack.push((label.into(), Entry::Run(Box::new(f))));
    }

    /// Keep an RAII guard alive until teardown, ordered with the closures.
    pub fn hold<G: Send + 'static>(&mut self, label: impl Into<String>, guard: G) {
        self.stack.push((label.into(), Entry::Hold(Box::new(guard))));
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.stack.len()
    }

    /// Run every cleanup, newest first. All of them run; the first error is
    /// returned.
    pub fn teardown(&mut self) -> Result<(), Error> {
        let mut first = None;

        while let Some((label, entry)) = self.stack.pop() {
            match entry {
                Entry::Run(f) => {
                    if let Err(e) = f(&self.device) {
                        crate::log!(Topic::Fixture, Warn, "cleanup '{label}' failed: {e}");
                        first.get_or_insert(e);
                    }
                }
                Entry::Hold(guard) => {
                    crate::log!(Topic::Fixture, Debug, "releasing '{label}'");
                    drop(guard);
                }
            }
        }

        first.map_or(Ok(()), Err)
    }
}

impl Deref for DeviceFixture {
    type Target = Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl Drop for DeviceFixture {
    fn drop(&mut self) {
        if self.stack.is_empty() {
            return;
        }
        if let Err(e) = self.teardown() {
            crate::log!(Topic::Fixture, Error, "teardown on drop: {e}");
        }
    }
}

///
/// TESTS
///
