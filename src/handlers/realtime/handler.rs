//! Realtime WebSocket handler
//!
//! Accepts the client socket, opens the authenticated upstream socket and
//! runs the relay between them until either side closes.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::conversation_log::ConversationLogger;
use crate::core::realtime::{
    CLIENT_REQUEST_ID_HEADER, RealtimeRelay, RealtimeResult, RelayFrame, RelaySink,
    UpstreamSocket, UpstreamTarget,
};
use crate::middleware::ConnectionGuard;
use crate::state::AppState;

/// Buffer size of each write queue
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Realtime WebSocket handler
///
/// Upgrades the connection and relays it to the configured upstream. The
/// `x-ms-client-request-id` header, when present, is forwarded on the
/// upstream handshake. Responds 503 when no upstream is configured.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    guard: Option<Extension<Arc<ConnectionGuard>>>,
    headers: HeaderMap,
) -> Response {
    let Some(upstream) = state.upstream.clone() else {
        warn!("Realtime session requested but no upstream is configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Realtime upstream is not configured",
        )
            .into_response();
    };

    let client_request_id = headers
        .get(CLIENT_REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let guard = guard.map(|Extension(guard)| guard);

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            // Held until the session ends
            let _guard = guard;
            handle_relay_socket(socket, state, upstream, client_request_id).await;
        })
}

async fn handle_relay_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    upstream: UpstreamTarget,
    client_request_id: Option<String>,
) {
    let session_id = Uuid::new_v4().to_string();
    info!(
        session_id,
        client_request_id = client_request_id.as_deref().unwrap_or("-"),
        "Realtime client connected"
    );

    let upstream_socket = match upstream.connect(client_request_id.as_deref()).await {
        Ok(socket) => socket,
        Err(e) => {
            error!(session_id, error = %e, "Failed to connect to realtime upstream");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let relay = RealtimeRelay::new(
        state.tool_table(),
        state.session_overrides().clone(),
        ConversationLogger::new(state.config.conversation_log_dir.as_deref(), &session_id),
    );

    let (upstream_tx, upstream_rx) = mpsc::channel::<RelayFrame>(CHANNEL_BUFFER_SIZE);
    let (client_tx, client_rx) = mpsc::channel::<RelayFrame>(CHANNEL_BUFFER_SIZE);
    let sink = RelaySink::new(upstream_tx, client_tx);

    let (client_write, client_read) = socket.split();
    let (upstream_write, upstream_read) = upstream_socket.split();

    let client_writer = tokio::spawn(write_client(client_write, client_rx));
    let upstream_writer = tokio::spawn(write_upstream(upstream_write, upstream_rx));

    let outcome = tokio::try_join!(
        client_to_upstream(&relay, client_read, &sink),
        upstream_to_client(&relay, upstream_read, &sink),
    );
    if let Err(e) = outcome {
        error!(session_id, error = %e, "Realtime session aborted");
    }

    sink.close_client().await;
    sink.close_upstream().await;
    drop(sink);
    let _ = tokio::join!(client_writer, upstream_writer);

    relay.finish().await;
    info!(session_id, "Realtime session ended");
}

async fn client_to_upstream(
    relay: &RealtimeRelay,
    mut read: SplitStream<WebSocket>,
    sink: &RelaySink,
) -> RealtimeResult<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                sink.send_upstream(relay.process_client_message(&text)).await;
            }
            Ok(Message::Binary(data)) => {
                debug!(bytes = data.len(), "Dropping binary frame from client");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Client closed the socket");
                break;
            }
            Err(e) => {
                debug!(error = %e, "Client socket error");
                break;
            }
        }
    }
    sink.close_upstream().await;
    Ok(())
}

async fn upstream_to_client(
    relay: &RealtimeRelay,
    mut read: SplitStream<UpstreamSocket>,
    sink: &RelaySink,
) -> RealtimeResult<()> {
    let outcome = async {
        while let Some(message) = read.next().await {
            match message {
                Ok(UpstreamMessage::Text(text)) => {
                    if let Some(forward) = relay.process_upstream_message(&text, sink).await? {
                        sink.send_client(forward).await;
                    }
                }
                Ok(UpstreamMessage::Binary(data)) => {
                    debug!(bytes = data.len(), "Dropping binary frame from upstream");
                }
                Ok(UpstreamMessage::Close(frame)) => {
                    debug!(?frame, "Upstream closed the socket");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Upstream socket error");
                    break;
                }
            }
        }
        Ok(())
    }
    .await;
    sink.close_client().await;
    outcome
}

async fn write_client(
    mut sender: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<RelayFrame>,
) {
    while let Some(frame) = frames.recv().await {
        let result = match frame {
            RelayFrame::Text(text) => sender.send(Message::Text(text.into())).await,
            RelayFrame::Close => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "Client socket write failed");
            break;
        }
    }
}

async fn write_upstream(
    mut sender: SplitSink<UpstreamSocket, UpstreamMessage>,
    mut frames: mpsc::Receiver<RelayFrame>,
) {
    while let Some(frame) = frames.recv().await {
        let result = match frame {
            RelayFrame::Text(text) => sender.send(UpstreamMessage::Text(text.into())).await,
            RelayFrame::Close => {
                let _ = sender.close().await;
                break;
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "Upstream socket write failed");
            break;
        }
    }
}
