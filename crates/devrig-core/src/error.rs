use derive_more::Display;
use thiserror::Error as ThisError;

///
/// Error
///
/// Public error envelope returned by every devrig operation.
///
/// The class says which part of the harness gave up; the message carries the
/// detail, usually including the raw shell output so a failing test can be
/// triaged from its log alone.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("[{class}] {message}")]
pub struct Error {
    pub class: ErrorClass,
    pub message: String,
}

impl Error {
    #[must_use]
    pub const fn new(class: ErrorClass, message: String) -> Self {
        Self { class, message }
    }

    /// The test's own expectation about device behaviour did not hold.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Assertion, message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Config, message.into())
    }

    /// The device dropped off the bus or never came back.
    pub fn device(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Device, message.into())
    }

    /// Broken harness invariant (worker thread gone, poisoned state).
    pub fn harness(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Harness, message.into())
    }

    /// The remote process answered with an error payload.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Remote, message.into())
    }

    /// An install session was driven out of order.
    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Session, message.into())
    }

    /// A shell command did not report the expected success marker.
    pub fn shell(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Shell, message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message.into())
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.class, ErrorClass::Timeout)
    }

    #[must_use]
    pub const fn is_device_unavailable(&self) -> bool {
        matches!(self.class, ErrorClass::Device)
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
#[remain::sorted]
pub enum ErrorClass {
    Assertion,
    Config,
    Device,
    Harness,
    Remote,
    Session,
    Shell,
    Timeout,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_class() {
        let err = Error::timeout("System failed to become ready!");

        assert_eq!(err.to_string(), "[Timeout] System failed to become ready!");
        assert!(err.is_timeout());
        assert!(!err.is_device_unavailable());
    }
}
