//! Connection lifecycle of the remote module

use super::client::{RemoteClientFactory, SystemInfo};
use super::context::{ClientSlot, PrivateContext};
use super::network::{MacAddress, NetworkHelper};
use super::{RemoteError, RemoteOptions};
use crate::persistence::{Secrets, SecretsStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CONTEXT_READY_TIMEOUT: Duration = Duration::from_secs(2);
const CONTEXT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared between the event thread and tasks in the private context
struct BridgeShared {
    host: String,
    state: Mutex<ConnectionState>,
    secrets: Mutex<Secrets>,
    store: Arc<dyn SecretsStore>,
    factory: Arc<dyn RemoteClientFactory>,
    network: Arc<dyn NetworkHelper>,
}

impl BridgeShared {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("remote: {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Moves from `from` to `to`, leaving any other state alone
    fn advance(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut current = self.state.lock();
        if *current != from {
            return false;
        }
        debug!("remote: {:?} -> {:?}", from, to);
        *current = to;
        true
    }

    fn reload_secrets(&self) {
        match self.store.load() {
            Ok(secrets) => *self.secrets.lock() = secrets,
            Err(e) => info!("remote: no stored secrets ({}), pairing from scratch", e),
        }
    }

    fn persist(&self, secrets: &Secrets) {
        if let Err(e) = self.store.save(secrets) {
            error!("remote: failed to save secrets: {}", e);
        }
    }

    /// Stores the key the TV handed out if it differs from the known one
    fn remember_key(&self, issued: Option<String>) {
        let Some(issued) = issued else {
            return;
        };
        let updated = {
            let mut secrets = self.secrets.lock();
            if secrets.key.as_deref() == Some(issued.as_str()) {
                return;
            }
            secrets.key = Some(issued);
            secrets.clone()
        };
        info!("remote: TV issued a new client key");
        self.persist(&updated);
    }

    /// Looks up and stores the TV's hardware address the first time we connect
    fn discover_mac(&self) {
        if self.secrets.lock().mac_address.is_some() {
            return;
        }
        match self.network.resolve_mac(&self.host) {
            Ok(Some(mac)) => {
                info!("remote: found hardware address {} for {}", mac, self.host);
                let updated = {
                    let mut secrets = self.secrets.lock();
                    secrets.mac_address = Some(mac.to_string());
                    secrets.clone()
                };
                self.persist(&updated);
            }
            Ok(None) => warn!("remote: hardware address of {} not found", self.host),
            Err(e) => warn!("remote: failed to look up hardware address: {}", e),
        }
    }

    fn mac_address(&self) -> Option<String> {
        self.secrets.lock().mac_address.clone()
    }
}

/// Creates a client, pairs and stores it in `slot`. Runs inside the private context.
async fn connect_task(shared: Arc<BridgeShared>, slot: ClientSlot) -> Result<SystemInfo, RemoteError> {
    shared.set_state(ConnectionState::Connecting);
    let result = establish(&shared, &slot).await;
    match &result {
        Ok(_) => {
            // The caller may have given up and reset the state meanwhile
            if !shared.advance(ConnectionState::Connecting, ConnectionState::Connected) {
                warn!("remote: connection finished after the caller gave up");
            }
        }
        Err(_) => {
            slot.lock().await.take();
            shared.set_state(ConnectionState::Disconnected);
        }
    }
    result
}

async fn establish(shared: &Arc<BridgeShared>, slot: &ClientSlot) -> Result<SystemInfo, RemoteError> {
    let key = shared.secrets.lock().key.clone();
    info!("remote: connecting to {}", shared.host);
    let mut client = shared.factory.create(&shared.host, key);
    client.connect().await?;
    let info = client.system_info().await?;
    info!(
        "remote: confirmed connection to TV: {}",
        info.model_name.as_deref().unwrap_or("unknown model")
    );

    shared.remember_key(client.client_key());
    *slot.lock().await = Some(client);

    // ARP lookup and file writes block; keep them off the runtime thread
    let lookup = shared.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || lookup.discover_mac()).await {
        warn!("remote: hardware address lookup failed: {}", e);
    }
    Ok(info)
}

/// Owns the private context and the shared connection state
pub struct RemoteBridge {
    options: RemoteOptions,
    shared: Arc<BridgeShared>,
    context: Option<PrivateContext>,
}

impl RemoteBridge {
    pub fn new(
        options: RemoteOptions,
        factory: Arc<dyn RemoteClientFactory>,
        network: Arc<dyn NetworkHelper>,
        store: Arc<dyn SecretsStore>,
    ) -> Self {
        let shared = Arc::new(BridgeShared {
            host: options.host.clone(),
            state: Mutex::new(ConnectionState::Disconnected),
            secrets: Mutex::new(Secrets::default()),
            store,
            factory,
            network,
        });
        Self {
            options,
            shared,
            context: None,
        }
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn secrets(&self) -> Secrets {
        self.shared.secrets.lock().clone()
    }

    fn ensure_context(&mut self) -> Result<&PrivateContext, RemoteError> {
        if self.context.is_none() {
            self.context = Some(PrivateContext::start(CONTEXT_READY_TIMEOUT)?);
        }
        self.context.as_ref().ok_or(RemoteError::ContextStopped)
    }

    /// Connects and pairs, waiting at most the connect timeout.
    /// Does nothing while already connected.
    pub fn connect(&mut self) -> Result<(), RemoteError> {
        if self.state() == ConnectionState::Connected && self.context.is_some() {
            info!("remote: already connected");
            return Ok(());
        }
        self.shared.reload_secrets();

        let timeout = self.options.connect_timeout();
        let shared = self.shared.clone();
        let result = self.ensure_context().and_then(|context| {
            context.submit(connect_task(shared, context.client()), timeout)
        });

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                error!("remote: failed to connect to {}: {}", self.options.host, e);
                Err(e)
            }
        }
    }

    /// Sends a command over the open connection, waiting at most the command timeout
    pub fn send(&self, command: &str) {
        let Some(context) = &self.context else {
            warn!("remote: no connection to send {} over", command);
            return;
        };
        let slot = context.client();
        let name = command.to_string();
        let task = async move {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(client) => client.send_button(&name).await,
                None => Err(RemoteError::NotConnected),
            }
        };

        match context.submit(task, self.options.command_timeout()) {
            Ok(()) => info!("remote: sent {}", command),
            Err(e @ RemoteError::Timeout(_)) => {
                warn!("remote: sending {} failed: {}", command, e);
            }
            Err(e) => {
                warn!("remote: sending {} failed: {}", command, e);
                self.shared.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// Closes the connection if configured to, then stops the private context.
    /// Safe to call in any state.
    pub fn disconnect(&mut self) {
        if let Some(context) = &self.context {
            if self.options.disconnect_on_unload && self.state() == ConnectionState::Connected {
                let slot = context.client();
                let task = async move {
                    match slot.lock().await.as_mut() {
                        Some(client) => client.disconnect().await,
                        None => Ok(()),
                    }
                };
                match context.submit(task, self.options.command_timeout()) {
                    Ok(()) => info!("remote: disconnected from {}", self.options.host),
                    Err(e) => warn!("remote: failed to disconnect: {}", e),
                }
            }
        }

        if let Some(context) = self.context.take() {
            context.stop(CONTEXT_STOP_TIMEOUT);
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Broadcasts the magic packet to the stored hardware address and reconnects
    /// once the TV had time to boot
    pub fn wake_on_lan(&mut self) {
        let wol = self.options.wake_on_lan.clone();
        let Some(raw_mac) = self.shared.mac_address() else {
            warn!("remote: no hardware address known, cannot wake the TV");
            return;
        };
        let mac = match raw_mac.parse::<MacAddress>() {
            Ok(mac) => mac,
            Err(e) => {
                warn!("remote: {}", e);
                return;
            }
        };

        info!("remote: sending Wake-on-LAN packet to {} via {}", mac, wol.broadcast_address);
        if let Err(e) = self.shared.network.send_wake_packet(&mac, &wol.broadcast_address) {
            warn!("remote: failed to send Wake-on-LAN packet: {}", e);
            return;
        }

        let grace = wol.grace_period();
        if wol.blocking {
            info!("remote: waiting {:?} for the TV to boot", grace);
            std::thread::sleep(grace);
            self.disconnect();
            if let Err(e) = self.connect() {
                warn!("remote: reconnect after wake failed: {}", e);
            }
        } else {
            self.reconnect_in_background(grace);
        }
    }

    fn reconnect_in_background(&mut self, grace: Duration) {
        let shared = self.shared.clone();
        let context = match self.ensure_context() {
            Ok(context) => context,
            Err(e) => {
                warn!("remote: cannot reconnect in the background: {}", e);
                return;
            }
        };
        let slot = context.client();
        shared.set_state(ConnectionState::Connecting);
        context.spawn(async move {
            tokio::time::sleep(grace).await;
            match connect_task(shared, slot).await {
                Ok(_) => info!("remote: reconnected after wake"),
                Err(e) => warn!("remote: reconnect after wake failed: {}", e),
            }
        });
    }
}

impl Drop for RemoteBridge {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            context.stop(CONTEXT_STOP_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::remote::testing::{FakeFactory, FakeNetwork, FakeTv, MemoryStore, TV_MAC};

    fn bridge(tv: &FakeTv, store: Arc<MemoryStore>, options: RemoteOptions) -> RemoteBridge {
        RemoteBridge::new(
            options,
            Arc::new(FakeFactory(tv.clone())),
            Arc::new(FakeNetwork::new(tv.clone(), Some(TV_MAC))),
            store,
        )
    }

    #[test]
    fn connect_persists_rotated_key_and_hardware_address() {
        let tv = FakeTv::online();
        tv.state().issued_key = Some("new-key".into());
        let store = Arc::new(MemoryStore::with(Secrets {
            key: Some("old-key".into()),
            mac_address: None,
        }));
        let mut bridge = bridge(&tv, store.clone(), RemoteOptions::default());

        bridge.connect().unwrap();

        assert_eq!(bridge.state(), ConnectionState::Connected);
        assert_eq!(tv.state().keys_seen, vec![Some("old-key".to_string())]);
        assert_eq!(
            store.stored(),
            Some(Secrets {
                key: Some("new-key".into()),
                mac_address: Some("a8:23:fe:01:02:03".into()),
            })
        );
        bridge.disconnect();
    }

    #[test]
    fn connect_is_a_no_op_while_connected() {
        let tv = FakeTv::online();
        let mut bridge = bridge(&tv, Arc::default(), RemoteOptions::default());
        bridge.connect().unwrap();
        bridge.connect().unwrap();
        assert_eq!(tv.state().keys_seen.len(), 1);
        bridge.disconnect();
    }

    #[test]
    fn unreachable_tv_leaves_bridge_disconnected() {
        let tv = FakeTv::default();
        let mut bridge = bridge(&tv, Arc::default(), RemoteOptions::default());
        assert!(matches!(bridge.connect(), Err(RemoteError::Connection(_))));
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        bridge.disconnect();
    }

    #[test]
    fn hung_connect_times_out_and_stays_disconnected() {
        let tv = FakeTv::online();
        tv.state().hang_on_connect = true;
        let options = RemoteOptions {
            connect_timeout: 0.2,
            ..Default::default()
        };
        let mut bridge = bridge(&tv, Arc::default(), options);

        let started = std::time::Instant::now();
        let result = bridge.connect();

        assert!(matches!(result, Err(RemoteError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        bridge.disconnect();
        bridge.disconnect();
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        assert_eq!(tv.state().disconnects, 0);
    }

    #[test]
    fn slow_address_lookup_cannot_revive_an_abandoned_connect() {
        let tv = FakeTv::online();
        let network = FakeNetwork::new(tv.clone(), Some(TV_MAC))
            .with_resolve_delay(Duration::from_millis(500));
        let options = RemoteOptions {
            connect_timeout: 0.2,
            ..Default::default()
        };
        let mut bridge = RemoteBridge::new(
            options,
            Arc::new(FakeFactory(tv.clone())),
            Arc::new(network),
            Arc::new(MemoryStore::default()),
        );

        assert!(matches!(bridge.connect(), Err(RemoteError::Timeout(_))));
        std::thread::sleep(Duration::from_millis(600));

        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        bridge.disconnect();
    }

    #[test]
    fn commands_reach_the_tv() {
        let tv = FakeTv::online();
        let mut bridge = bridge(&tv, Arc::default(), RemoteOptions::default());
        bridge.connect().unwrap();
        bridge.send("VOLUMEUP");
        bridge.send("ENTER");
        assert_eq!(tv.state().sent, vec!["VOLUMEUP", "ENTER"]);
        bridge.disconnect();
    }

    #[test]
    fn hung_command_times_out_without_dropping_the_connection() {
        let tv = FakeTv::online();
        let options = RemoteOptions {
            command_timeout: 0.05,
            ..Default::default()
        };
        let mut bridge = bridge(&tv, Arc::default(), options);
        bridge.connect().unwrap();
        tv.state().hang_on_send = true;

        let started = std::time::Instant::now();
        bridge.send("HOME");

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(bridge.state(), ConnectionState::Connected);
        bridge.disconnect();
    }

    #[test]
    fn failed_command_marks_bridge_disconnected() {
        let tv = FakeTv::online();
        let mut bridge = bridge(&tv, Arc::default(), RemoteOptions::default());
        bridge.connect().unwrap();
        tv.state().online = false;

        bridge.send("HOME");

        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        bridge.disconnect();
    }

    #[test]
    fn disconnect_is_idempotent() {
        let tv = FakeTv::online();
        let mut bridge = bridge(&tv, Arc::default(), RemoteOptions::default());
        bridge.disconnect();
        bridge.connect().unwrap();
        bridge.disconnect();
        bridge.disconnect();
        assert_eq!(tv.state().disconnects, 1);
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_skips_goodbye_when_disabled() {
        let tv = FakeTv::online();
        let options = RemoteOptions {
            disconnect_on_unload: false,
            ..Default::default()
        };
        let mut bridge = bridge(&tv, Arc::default(), options);
        bridge.connect().unwrap();
        bridge.disconnect();
        assert_eq!(tv.state().disconnects, 0);
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
    }
}
