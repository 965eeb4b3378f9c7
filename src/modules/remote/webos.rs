//! LG webOS client over the TV's local websocket API
//!
//! Pairing registers a manifest on the main socket. The TV answers with a
//! client key which skips the on-screen prompt on later connects. Remote
//! buttons go through the separate pointer input socket the TV hands out on
//! request.

use super::client::{RemoteClient, RemoteClientFactory, SystemInfo};
use super::RemoteError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PORT: u16 = 3000;
const REGISTER_ID: &str = "register_0";
const SYSTEM_INFO_URI: &str = "ssap://system/getSystemInfo";
const POINTER_SOCKET_URI: &str = "ssap://com.webos.service.networkinput/getPointerInputSocket";

const PERMISSIONS: [&str; 9] = [
    "LAUNCH",
    "CONTROL_AUDIO",
    "CONTROL_DISPLAY",
    "CONTROL_INPUT_JOYSTICK",
    "CONTROL_INPUT_MEDIA_PLAYBACK",
    "CONTROL_MOUSE_AND_KEYBOARD",
    "CONTROL_POWER",
    "READ_INSTALLED_APPS",
    "READ_CURRENT_CHANNEL",
];

fn connection_error(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Connection(e.to_string())
}

fn register_message(client_key: Option<&str>) -> Value {
    let mut payload = json!({
        "forcePairing": false,
        "pairingType": "PROMPT",
        "manifest": {
            "manifestVersion": 1,
            "appVersion": "1.1",
            "permissions": PERMISSIONS,
        },
    });
    if let Some(key) = client_key {
        payload["client-key"] = Value::String(key.to_string());
    }
    json!({ "type": "register", "id": REGISTER_ID, "payload": payload })
}

fn button_frame(command: &str) -> String {
    format!("type:button\nname:{}\n\n", command)
}

/// Next JSON text frame; other frames are skipped
async fn next_json(socket: &mut Socket) -> Result<Value, RemoteError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text)
                    .map_err(|e| RemoteError::Protocol(e.to_string()));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(RemoteError::Connection("socket closed by the TV".into()));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(connection_error(e)),
        }
    }
}

fn error_text(message: &Value) -> String {
    message["error"]
        .as_str()
        .unwrap_or("request rejected")
        .to_string()
}

pub struct WebOsClient {
    host: String,
    client_key: Option<String>,
    main: Option<Socket>,
    input: Option<Socket>,
    next_id: u64,
}

impl WebOsClient {
    pub fn new(host: &str, client_key: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            client_key,
            main: None,
            input: None,
            next_id: 1,
        }
    }

    async fn request(&mut self, uri: &str, payload: Value) -> Result<Value, RemoteError> {
        let id = format!("request_{}", self.next_id);
        self.next_id += 1;
        let socket = self.main.as_mut().ok_or(RemoteError::NotConnected)?;

        let message = json!({ "id": id, "type": "request", "uri": uri, "payload": payload });
        socket
            .send(Message::Text(message.to_string()))
            .await
            .map_err(connection_error)?;

        loop {
            let response = next_json(socket).await?;
            if response["id"].as_str() != Some(id.as_str()) {
                debug!("webos: skipping unrelated message {}", response);
                continue;
            }
            return match response["type"].as_str() {
                Some("error") => Err(RemoteError::Protocol(error_text(&response))),
                _ => Ok(response["payload"].clone()),
            };
        }
    }

    async fn input_socket(&mut self) -> Result<&mut Socket, RemoteError> {
        if self.input.is_none() {
            let payload = self.request(POINTER_SOCKET_URI, json!({})).await?;
            let path = payload["socketPath"]
                .as_str()
                .ok_or_else(|| RemoteError::Protocol("no pointer socket path".into()))?;
            let (socket, _) = connect_async(path).await.map_err(connection_error)?;
            debug!("webos: opened pointer input socket");
            self.input = Some(socket);
        }
        self.input.as_mut().ok_or(RemoteError::NotConnected)
    }
}

#[async_trait]
impl RemoteClient for WebOsClient {
    async fn connect(&mut self) -> Result<(), RemoteError> {
        let url = format!("ws://{}:{}/", self.host, PORT);
        let (mut socket, _) = connect_async(url.as_str()).await.map_err(connection_error)?;

        let register = register_message(self.client_key.as_deref());
        socket
            .send(Message::Text(register.to_string()))
            .await
            .map_err(connection_error)?;

        loop {
            let message = next_json(&mut socket).await?;
            if message["id"].as_str() != Some(REGISTER_ID) {
                continue;
            }
            match message["type"].as_str() {
                Some("registered") => {
                    if let Some(key) = message["payload"]["client-key"].as_str() {
                        self.client_key = Some(key.to_string());
                    }
                    break;
                }
                Some("error") => return Err(RemoteError::Protocol(error_text(&message))),
                _ => info!("webos: accept the pairing prompt on the TV"),
            }
        }

        self.main = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RemoteError> {
        if let Some(mut input) = self.input.take() {
            let _ = input.close(None).await;
        }
        if let Some(mut main) = self.main.take() {
            main.close(None).await.map_err(connection_error)?;
        }
        Ok(())
    }

    async fn send_button(&mut self, command: &str) -> Result<(), RemoteError> {
        let socket = self.input_socket().await?;
        socket
            .send(Message::Text(button_frame(command)))
            .await
            .map_err(connection_error)
    }

    async fn system_info(&mut self) -> Result<SystemInfo, RemoteError> {
        let payload = self.request(SYSTEM_INFO_URI, json!({})).await?;
        Ok(SystemInfo {
            model_name: payload["modelName"].as_str().map(String::from),
        })
    }

    fn client_key(&self) -> Option<String> {
        self.client_key.clone()
    }
}

#[derive(Debug, Default, Clone)]
pub struct WebOsFactory;

impl RemoteClientFactory for WebOsFactory {
    fn create(&self, host: &str, client_key: Option<String>) -> Box<dyn RemoteClient> {
        Box::new(WebOsClient::new(host, client_key))
    }
}
