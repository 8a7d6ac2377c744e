//! Scripted realtime upstream and gateway helpers
//!
//! The mock accepts one WebSocket connection, records the handshake headers
//! and every text frame it receives, and replies with scripted events:
//! - `session.created` right after the handshake
//! - the `on_first_message` script after the client's first frame
//! - the `on_response_create` script each time `response.create` arrives

// Not every test binary uses every helper
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_hdr_async, connect_async};

use voicerag_gateway::{ServerConfig, routes, state::AppState};

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub uri: String,
    pub request_id: Option<String>,
    pub api_key: Option<String>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub received: mpsc::UnboundedReceiver<Value>,
    pub handshake: Arc<Mutex<Option<Handshake>>>,
}

impl MockUpstream {
    pub async fn spawn(on_first_message: Vec<Value>, on_response_create: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, received) = mpsc::unbounded_channel();
        let handshake = Arc::new(Mutex::new(None));

        let seen = handshake.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let header = |name: &str| {
                    request
                        .headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                *seen.lock() = Some(Handshake {
                    uri: request.uri().to_string(),
                    request_id: header("x-ms-client-request-id"),
                    api_key: header("api-key"),
                });
                Ok(response)
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            let created = json!({
                "type": "session.created",
                "session": {
                    "id": "sess_upstream",
                    "instructions": "upstream default",
                    "tools": [],
                    "voice": "verse"
                }
            });
            if write.send(Message::Text(created.to_string().into())).await.is_err() {
                return;
            }

            let mut first = true;
            while let Some(Ok(message)) = read.next().await {
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                let is_response_create = value["type"] == "response.create";
                let _ = tx.send(value);

                let script = if first {
                    first = false;
                    &on_first_message
                } else if is_response_create {
                    &on_response_create
                } else {
                    continue;
                };
                for event in script {
                    if write.send(Message::Text(event.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }
            let _ = write.close().await;
        });

        Self {
            addr,
            received,
            handshake,
        }
    }

    /// `http://` endpoint the gateway maps to `ws://`
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Next frame received from the relay
    pub async fn next_received(&mut self) -> Option<Value> {
        tokio::time::timeout(READ_TIMEOUT, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Frames received until one of type `kind`, inclusive
    pub async fn received_until(&mut self, kind: &str) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_received().await {
            let done = frame["type"] == kind;
            frames.push(frame);
            if done {
                break;
            }
        }
        frames
    }
}

/// Gateway config pointing at the given upstream, with an api-key credential
pub fn gateway_config(upstream_endpoint: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.realtime.endpoint = Some(upstream_endpoint.to_string());
    config.realtime.deployment = Some("gpt-4o-realtime".to_string());
    config.realtime.api_key = Some("test-key".to_string());
    config.realtime.system_message = Some("Réponds en français.".to_string());
    config
}

/// Serve the gateway on an ephemeral port
pub async fn spawn_gateway(config: ServerConfig) -> SocketAddr {
    let state = AppState::new(config).unwrap();
    let app = routes::create_app_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub async fn connect_client(gateway: SocketAddr, request_id: Option<&str>) -> ClientSocket {
    let mut request = format!("ws://{gateway}/realtime")
        .into_client_request()
        .unwrap();
    if let Some(id) = request_id {
        request
            .headers_mut()
            .insert("x-ms-client-request-id", HeaderValue::from_str(id).unwrap());
    }
    let (socket, _) = connect_async(request).await.unwrap();
    socket
}

pub async fn send_json(socket: &mut ClientSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON text frame, or `None` on close or timeout
pub async fn next_json(socket: &mut ClientSocket) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(READ_TIMEOUT, socket.next())
            .await
            .ok()??;
        match message {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Frames until `count` events of type `kind` have been seen
pub async fn collect_until(socket: &mut ClientSocket, kind: &str, count: usize) -> Vec<Value> {
    let mut frames = Vec::new();
    let mut seen = 0;
    while let Some(frame) = next_json(socket).await {
        if frame["type"] == kind {
            seen += 1;
        }
        frames.push(frame);
        if seen == count {
            break;
        }
    }
    frames
}

pub fn session_update() -> Value {
    json!({
        "type": "session.update",
        "session": {
            "instructions": "client instructions",
            "turn_detection": {"type": "server_vad"}
        }
    })
}

/// The function-call event sequence for one call
pub fn function_call_events(call_id: &str, name: &str, arguments: &str) -> Vec<Value> {
    let item = json!({"id": "item_fc", "type": "function_call", "call_id": call_id, "name": name});
    let mut done_item = item.clone();
    done_item["arguments"] = json!(arguments);
    vec![
        json!({"type": "response.output_item.added", "item": item}),
        json!({"type": "conversation.item.created", "previous_item_id": "item_user", "item": item}),
        json!({"type": "response.function_call_arguments.delta", "call_id": call_id, "delta": arguments}),
        json!({"type": "response.function_call_arguments.done", "call_id": call_id, "arguments": arguments}),
        json!({"type": "response.output_item.done", "item": done_item}),
        json!({"type": "response.done", "response": {"output": [done_item]}}),
    ]
}
