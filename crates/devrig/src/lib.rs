//! devrig facade crate.
//!
//! This crate is the recommended dependency for host-side device tests. It
//! re-exports the public devrig-core surface and adds a prelude:
//!
//! ```ignore
//! use devrig::prelude::*;
//!
//! let ctx = TestContext::from_config()?;
//! ctx.install().add_file("CtsSplitApp.apk").force_queryable().run()?;
//! ctx.device().run_device_tests(&app, ".SplitAppTest", None)?;
//! ```
//!
//! For lower-level access use the module paths (`shell`, `install`, `dispatch`, ...).

// -----------------------------------------------------------------------------
// Modules
// -----------------------------------------------------------------------------
pub use devrig_core::{
    config, context, device, dispatch, ids, install, instrument, log, poll, shell,
};

// -----------------------------------------------------------------------------
// Re-exports
// -----------------------------------------------------------------------------
pub use devrig_core::{Error, ErrorClass, init_config};

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// -----------------------------------------------------------------------------
// Prelude
// -----------------------------------------------------------------------------

///
/// Opinionated prelude for test code.
///
/// Library code should import from specific paths instead.
///

pub mod prelude {
    pub use crate::{
        Error,
        config::{Config, ConfigModel},
        context::TestContext,
        device::{Device, DeviceFixture, SettingsNamespace},
        dispatch::{Command, Dispatcher, PendingResult, RemoteError},
        ids::{ComponentName, PackageName, SessionId, UserId},
        install::{INSTALL_FAILED_MISSING_SPLIT, InstallMultiple, InstallOutcome},
        instrument::InstrumentationRun,
        poll::wait_until,
        shell::{AdbExecutor, ShellExecutor},
    };
    pub use serde_json::{Value, json};
}

///
/// TESTS
///
