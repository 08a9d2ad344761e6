use crate::{
    Error,
    config::{Config, ConfigModel},
    device::{Device, DeviceFixture},
    dispatch::{Dispatcher, PendingResult, ShellBroadcastTransport, Transport},
    ids::PackageName,
    install::InstallMultiple,
    shell::{AdbExecutor, ShellExecutor},
};
use serde_json::{Map, Value};
use std::sync::Arc;

///
/// TestContext
///
/// Everything one host-side test talks to: the device under test and a
/// dispatcher for its companion apps. Built per test and passed in.
///

pub struct TestContext {
    device: Device,
    dispatcher: Dispatcher,
}

impl TestContext {
    pub fn new(
        shell: Arc<dyn ShellExecutor>,
        transport: Arc<dyn Transport>,
        config: Arc<ConfigModel>,
    ) -> Result<Self, Error> {
        let dispatcher = Dispatcher::new(transport, &config)?;

        Ok(Self {
            device: Device::new(shell, config),
            dispatcher,
        })
    }

    /// Commands travel as broadcasts to the configured receiver.
    pub fn with_broadcast(
        shell: Arc<dyn ShellExecutor>,
        config: Arc<ConfigModel>,
    ) -> Result<Self, Error> {
        let transport = Arc::new(ShellBroadcastTransport::new(
            shell.clone(),
            config.device.command_receiver.clone(),
        ));

        Self::new(shell, transport, config)
    }

    /// A context for the device named by the active config, reached over adb.
    pub fn from_config() -> Result<Self, Error> {
        let config = Config::get();
        let shell = Arc::new(AdbExecutor::from_config(&config));

        Self::with_broadcast(shell, config)
    }

    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn config(&self) -> &ConfigModel {
        self.device.config()
    }

    #[must_use]
    pub fn install(&self) -> InstallMultiple {
        self.device.install_multiple()
    }

    /// A fresh cleanup stack over this context's device.
    #[must_use]
    pub fn fixture(&self) -> DeviceFixture {
        DeviceFixture::new(self.device.clone())
    }

    pub fn send_command(
        &self,
        source: &PackageName,
        target: Option<&PackageName>,
        payload: Option<Map<String, Value>>,
        action: &str,
        wait_for_ready: bool,
    ) -> Result<PendingResult, Error> {
        Ok(self
            .dispatcher
            .send_command(source, target, payload, action, wait_for_ready)?)
    }

    pub fn send_command_blocking(
        &self,
        source: &PackageName,
        target: Option<&PackageName>,
        payload: Option<Map<String, Value>>,
        action: &str,
    ) -> Result<Value, Error> {
        Ok(self
            .dispatcher
            .send_command_blocking(source, target, payload, action)?)
    }
}

///
/// TESTS
///
