//! Test utilities and fakes for exercising devrig without a device.
//!
//! `FakeShell` stands in for the device shell (with a small in-memory package
//! manager behind `pm`), `FakeCompanion` for an app answering dispatched
//! commands, and `Fake` derives stable dummy identities from a numeric seed.

mod companion;
mod pm;
mod shell;

pub use companion::FakeCompanion;
pub use pm::{FakeApk, FakePackageManager};
pub use shell::FakeShell;

use devrig_core::{
    config::ConfigModel,
    ids::{PackageName, UserId},
};
use serde_json::{Map, Value};

/// Defaults with every wait shrunk to a few milliseconds.
#[must_use]
pub fn fast_config() -> ConfigModel {
    let mut cfg = ConfigModel::default();
    cfg.boot.attempts = 3;
    cfg.boot.interval_ms = 1;
    cfg.poll.interval_ms = 1;
    cfg.timeouts.readiness_ms = 100;
    cfg.timeouts.result_ms = 300;
    cfg.timeouts.user_switch_ms = 20;
    cfg.timeouts.user_switch_settle_ms = 0;
    cfg.timeouts.lskf_capture_ms = 20;
    cfg.timeouts.shutdown_ms = 20;
    cfg.timeouts.online_ms = 20;

    cfg
}

///
/// Deterministic dummy-value generator for tests.
///
/// Identities derived from the same seed are equal, different seeds never
/// collide.
///

pub struct Fake;

impl Fake {
    /// `com.devrig.fake.app<seed>`.
    #[must_use]
    pub fn package(seed: u32) -> PackageName {
        PackageName::new(format!("com.devrig.fake.app{seed}"))
            .expect("generated package names are valid")
    }

    /// Secondary users start at 10 on Android.
    #[must_use]
    pub const fn user(seed: u32) -> UserId {
        UserId(10 + seed)
    }

    /// App uid of `user` for app id `10000 + seed`.
    #[must_use]
    pub const fn uid(user: UserId, seed: u32) -> u32 {
        user.0 * 100_000 + 10_000 + seed
    }

    #[must_use]
    pub fn payload(seed: u32) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("seed".to_string(), Value::from(seed));
        map.insert("name".to_string(), Value::from(format!("fake-{seed}")));

        map
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fakes_are_deterministic_and_unique() {
        assert_eq!(Fake::package(7), Fake::package(7));
        assert_ne!(Fake::package(7), Fake::package(8));
        assert_eq!(Fake::uid(Fake::user(0), 5), 1_010_005);
        assert_eq!(Fake::payload(3)["name"], "fake-3");
    }

    #[test]
    fn fast_config_is_valid() {
        use devrig_core::config::Config;

        assert!(Config::parse_toml(&toml_of(&fast_config())).is_ok());
    }

    fn toml_of(cfg: &ConfigModel) -> String {
        format!(
            "[timeouts]\nreadiness_ms = {}\nresult_ms = {}\n[boot]\nattempts = {}\n",
            cfg.timeouts.readiness_ms, cfg.timeouts.result_ms, cfg.boot.attempts
        )
    }
}
