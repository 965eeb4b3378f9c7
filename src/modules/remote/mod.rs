//! Remote module: turns the controller into a smart-TV remote.
//!
//! Button and d-pad events resolve to TV command names which the
//! [`RemoteBridge`] sends over the network. While the TV is off, the power
//! command wakes it with a Wake-on-LAN packet instead.

pub mod bridge;
pub mod client;
mod context;
pub mod network;
#[cfg(test)]
pub(crate) mod testing;
pub mod webos;

pub use bridge::{ConnectionState, RemoteBridge};
pub use client::{RemoteClient, RemoteClientFactory, SystemInfo};
pub use network::{MacAddress, NetworkHelper, SystemNetwork};

use crate::mapping::{HatDirection, KeyEvent, KeyMap, Module, ModuleError};
use crate::persistence::{FileSecretsStore, ModuleConfig, SecretsStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Not connected to the TV")]
    NotConnected,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution context is not running")]
    ContextStopped,

    #[error("Failed to start execution context: {0}")]
    Context(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Invalid hardware address '{0}'")]
    InvalidHardwareAddress(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WakeOnLanOptions {
    pub enabled: bool,
    /// Seconds to wait for the TV to boot after the magic packet
    pub sleep_after_wake: f64,
    pub broadcast_address: String,
    /// Wait for the reconnect on the event thread instead of in the background
    pub blocking: bool,
}

impl Default for WakeOnLanOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            sleep_after_wake: 25.0,
            broadcast_address: "192.168.1.255".to_string(),
            blocking: true,
        }
    }
}

impl WakeOnLanOptions {
    pub fn grace_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.sleep_after_wake).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RemoteOptions {
    pub host: String,
    pub disconnect_on_unload: bool,
    pub secrets_file: PathBuf,
    /// Command that triggers Wake-on-LAN while disconnected
    pub power_action: String,
    /// Seconds
    pub connect_timeout: f64,
    /// Seconds
    pub command_timeout: f64,
    pub wake_on_lan: WakeOnLanOptions,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            host: "192.168.1.1".to_string(),
            disconnect_on_unload: true,
            secrets_file: PathBuf::from("data/remote-secrets.toml"),
            power_action: "POWER".to_string(),
            connect_timeout: 15.0,
            command_timeout: 5.0,
            wake_on_lan: WakeOnLanOptions::default(),
        }
    }
}

impl RemoteOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.connect_timeout).unwrap_or(Duration::from_secs(15))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.command_timeout).unwrap_or(Duration::from_secs(5))
    }
}

pub struct Remote {
    bridge: RemoteBridge,
    mappings: KeyMap<String>,
}

impl Remote {
    pub const NAME: &'static str = "remote";

    /// Builds the module from its config record, with secrets stored in `secrets-file`
    pub fn new(
        config: &ModuleConfig,
        factory: Arc<dyn RemoteClientFactory>,
        network: Arc<dyn NetworkHelper>,
    ) -> Self {
        let options: RemoteOptions = config.options_or_default(Self::NAME);
        let store = Arc::new(FileSecretsStore::new(options.secrets_file.clone()));
        let mut mappings = Self::default_mappings();
        mappings.apply_overrides(Self::NAME, &config.mappings);
        Self::with_parts(options, mappings, factory, network, store)
    }

    pub fn with_parts(
        options: RemoteOptions,
        mappings: KeyMap<String>,
        factory: Arc<dyn RemoteClientFactory>,
        network: Arc<dyn NetworkHelper>,
        store: Arc<dyn SecretsStore>,
    ) -> Self {
        Self {
            bridge: RemoteBridge::new(options, factory, network, store),
            mappings,
        }
    }

    pub fn default_mappings() -> KeyMap<String> {
        let command = |name: &str| name.to_string();
        KeyMap::new()
            .hat(HatDirection::Up, command("UP"))
            .hat(HatDirection::Down, command("DOWN"))
            .hat(HatDirection::Left, command("LEFT"))
            .hat(HatDirection::Right, command("RIGHT"))
            .button(0, command("ENTER")) // A
            .button(1, command("BACK")) // B
            .button(2, command("PLAY")) // X
            .button(3, command("PAUSE")) // Y
            .button(4, command("VOLUMEDOWN"))
            .button(5, command("VOLUMEUP"))
            .button(6, command("HOME")) // back
            .button(7, command("MENU")) // start
            .button(8, command("INPUT_HUB")) // left stick
            .button(9, command("POWER")) // right stick
    }

    pub fn bridge(&self) -> &RemoteBridge {
        &self.bridge
    }
}

impl Module for Remote {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load(&mut self) -> Result<(), ModuleError> {
        self.bridge.connect()?;
        Ok(())
    }

    fn unload(&mut self) -> Result<(), ModuleError> {
        self.bridge.disconnect();
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent) {
        let Some(command) = self.mappings.resolve(event).cloned() else {
            return;
        };

        match self.bridge.state() {
            ConnectionState::Connected => self.bridge.send(&command),
            ConnectionState::Disconnected
                if command == self.bridge.options().power_action
                    && self.bridge.options().wake_on_lan.enabled =>
            {
                info!("remote: TV is off, waking it up");
                self.bridge.wake_on_lan();
            }
            state => debug!("remote: ignoring {} while {:?}", command, state),
        }
    }
}
