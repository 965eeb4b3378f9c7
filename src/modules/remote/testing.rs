//! In-memory TV, network and secrets store for bridge tests

use super::client::{RemoteClient, RemoteClientFactory, SystemInfo};
use super::network::{MacAddress, NetworkHelper};
use super::RemoteError;
use crate::persistence::{Secrets, SecretsError, SecretsStore};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TV_MAC: MacAddress = MacAddress::new([0xa8, 0x23, 0xfe, 0x01, 0x02, 0x03]);

#[derive(Debug, Default)]
pub struct TvState {
    pub online: bool,
    /// Key handed out on the next successful connect
    pub issued_key: Option<String>,
    /// Keys presented by clients, one entry per connect attempt
    pub keys_seen: Vec<Option<String>>,
    pub sent: Vec<String>,
    pub disconnects: usize,
    pub hang_on_connect: bool,
    pub hang_on_send: bool,
}

/// Simulated TV shared by every client the factory creates
#[derive(Clone, Default)]
pub struct FakeTv(pub Arc<Mutex<TvState>>);

impl FakeTv {
    pub fn online() -> Self {
        let tv = Self::default();
        tv.0.lock().unwrap().online = true;
        tv
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, TvState> {
        self.0.lock().unwrap()
    }
}

struct FakeClient {
    tv: FakeTv,
    key: Option<String>,
}

#[async_trait]
impl RemoteClient for FakeClient {
    async fn connect(&mut self) -> Result<(), RemoteError> {
        let hang = self.tv.state().hang_on_connect;
        if hang {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        let mut tv = self.tv.state();
        tv.keys_seen.push(self.key.clone());
        if !tv.online {
            return Err(RemoteError::Connection("host unreachable".into()));
        }
        if let Some(key) = tv.issued_key.clone() {
            self.key = Some(key);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RemoteError> {
        self.tv.state().disconnects += 1;
        Ok(())
    }

    async fn send_button(&mut self, command: &str) -> Result<(), RemoteError> {
        let hang = self.tv.state().hang_on_send;
        if hang {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        let mut tv = self.tv.state();
        if !tv.online {
            return Err(RemoteError::Connection("connection reset".into()));
        }
        tv.sent.push(command.to_string());
        Ok(())
    }

    async fn system_info(&mut self) -> Result<SystemInfo, RemoteError> {
        Ok(SystemInfo {
            model_name: Some("OLED55C1".into()),
        })
    }

    fn client_key(&self) -> Option<String> {
        self.key.clone()
    }
}

pub struct FakeFactory(pub FakeTv);

impl RemoteClientFactory for FakeFactory {
    fn create(&self, _host: &str, client_key: Option<String>) -> Box<dyn RemoteClient> {
        Box::new(FakeClient {
            tv: self.0.clone(),
            key: client_key,
        })
    }
}

/// Network that knows the TV's address and powers it on when woken
pub struct FakeNetwork {
    pub tv: FakeTv,
    pub mac: Option<MacAddress>,
    pub wakes: Mutex<Vec<(MacAddress, String)>>,
    /// Time the address lookup blocks for
    pub resolve_delay: Duration,
}

impl FakeNetwork {
    pub fn new(tv: FakeTv, mac: Option<MacAddress>) -> Self {
        Self {
            tv,
            mac,
            wakes: Mutex::new(Vec::new()),
            resolve_delay: Duration::ZERO,
        }
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }
}

impl NetworkHelper for FakeNetwork {
    fn resolve_mac(&self, _host: &str) -> Result<Option<MacAddress>, RemoteError> {
        std::thread::sleep(self.resolve_delay);
        Ok(self.mac)
    }

    fn send_wake_packet(&self, mac: &MacAddress, broadcast: &str) -> Result<(), RemoteError> {
        self.wakes.lock().unwrap().push((*mac, broadcast.to_string()));
        self.tv.state().online = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub secrets: Mutex<Option<Secrets>>,
}

impl MemoryStore {
    pub fn with(secrets: Secrets) -> Self {
        Self {
            secrets: Mutex::new(Some(secrets)),
        }
    }

    pub fn stored(&self) -> Option<Secrets> {
        self.secrets.lock().unwrap().clone()
    }
}

impl SecretsStore for MemoryStore {
    fn load(&self) -> Result<Secrets, SecretsError> {
        self.stored().ok_or_else(|| SecretsError::Read {
            path: PathBuf::from("memory"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }

    fn save(&self, secrets: &Secrets) -> Result<(), SecretsError> {
        *self.secrets.lock().unwrap() = Some(secrets.clone());
        Ok(())
    }
}
