//! Core devrig library used by host-side device tests.
//!
//! Most users should depend on the `devrig` facade crate, which re-exports this
//! crate and adds a prelude for test code.
//!
//! ## Layering
//!
//! devrig keeps the shell surface thin and pushes protocol knowledge upward:
//! - `shell/` executes raw commands against a device (`adb shell`, push, online waits).
//! - `install/` drives the create/write/commit package session protocol.
//! - `dispatch/` sends commands to companion apps and hands back result futures.
//! - `poll` holds the convergence helpers used for eventually-consistent state.
//! - `device/` wraps the consumed shell vocabulary in typed operations and guards.
//! - `instrument/` launches on-device tests and parses their status stream.
//! - `context` composes a device and a dispatcher for a single test.
//!
//! The default flow is: test → context → device/dispatch/install → shell.

pub mod config;
pub mod context;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod install;
pub mod instrument;
pub mod log;
pub mod poll;
pub mod shell;

#[cfg(test)]
pub(crate) mod test;

pub use error::{Error, ErrorClass};

pub(crate) use thiserror::Error as ThisError;

///
/// Crate Version
///

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// init and validate config
// kept at the crate root so the CLI does not reach into config internals
pub fn init_config(toml: &str) -> Result<(), String> {
    config::Config::init_from_toml(toml)
        .map(|_| ())
        .map_err(|err| err.to_string())
}
