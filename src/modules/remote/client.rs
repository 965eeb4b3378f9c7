//! Seam between the bridge and the TV protocol

use super::RemoteError;
use async_trait::async_trait;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub model_name: Option<String>,
}

/// Connection to one TV. Only ever driven from the bridge's private runtime.
#[async_trait]
pub trait RemoteClient: Send {
    /// Opens the connection and pairs, reusing the client key if one was given
    async fn connect(&mut self) -> Result<(), RemoteError>;

    async fn disconnect(&mut self) -> Result<(), RemoteError>;

    /// Sends a remote button such as `ENTER` or `VOLUMEUP`
    async fn send_button(&mut self, command: &str) -> Result<(), RemoteError>;

    async fn system_info(&mut self) -> Result<SystemInfo, RemoteError>;

    /// Pairing key currently in use; the TV may issue a new one on connect
    fn client_key(&self) -> Option<String>;
}

pub trait RemoteClientFactory: Send + Sync {
    fn create(&self, host: &str, client_key: Option<String>) -> Box<dyn RemoteClient>;
}
