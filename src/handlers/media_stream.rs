//! Media stream WebSocket handler
//!
//! The telephony platform opens `/media-stream` after the `/incoming-call`
//! TwiML connects the call. Each connection gets its own model connection and
//! [`BridgeSession`]; the socket is split so that a writer task drains the
//! session's outbound caller messages while the session reads inbound text
//! frames directly.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::bridge::{BridgeSession, CallerLink};
use crate::core::realtime::{ModelConnection, OpenAIRealtime};
use crate::core::session::initialize_session;
use crate::middleware::ClientIp;
use crate::state::AppState;

/// Outbound caller messages buffered ahead of the socket writer
const CALLER_CHANNEL_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long to wait for the model connection task to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Media stream WebSocket handler
///
/// Upgrades the connection and bridges it to the realtime model. When the
/// connection limit middleware admitted the request, the slot it reserved is
/// released once the call ends.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let client_ip = client_ip.map(|Extension(ip)| ip);
    debug!(client_ip = ?client_ip, "Media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            handle_media_stream(socket, state.clone()).await;
            if let Some(ClientIp(ip)) = client_ip {
                state.release_connection(ip);
            }
        })
}

/// Bridge one media stream connection until either side ends.
async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "Media stream connected");

    let (mut sender, receiver) = socket.split();
    let (caller, mut outbound_rx) = CallerLink::channel(CALLER_CHANNEL_SIZE);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize caller message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                debug!("Caller socket write failed: {}", e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    let client = match OpenAIRealtime::new(state.config.realtime_config()) {
        Ok(client) => client,
        Err(e) => {
            error!(session_id = %session_id, "Realtime model is not configured: {}", e);
            drop(caller);
            let _ = writer.await;
            return;
        }
    };

    let ModelConnection { link, events, task } = match client.connect().await {
        Ok(connection) => connection,
        Err(e) => {
            error!(session_id = %session_id, "Failed to connect to the realtime model: {}", e);
            drop(caller);
            let _ = writer.await;
            return;
        }
    };

    if let Err(e) = initialize_session(&link, client.config()).await {
        warn!(session_id = %session_id, "Session initialization was not delivered: {}", e);
    }

    // Text frames until the caller closes; binary and control frames are
    // not part of the media stream protocol.
    let inbound = Box::pin(
        receiver
            .take_while(|frame| {
                future::ready(matches!(frame, Ok(message) if !matches!(message, Message::Close(_))))
            })
            .filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                    _ => None,
                })
            }),
    );

    let session = BridgeSession::new(state.tool_context(), link.clone(), caller);
    let call_state = session.state();
    let result = session.run(inbound, events).await;

    link.close().await;
    if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
        warn!("Model connection task did not stop in time");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, writer).await.is_err() {
        warn!("Caller writer did not stop in time");
    }

    let identity = call_state.identity();
    match result {
        Ok(()) => info!(
            session_id = %session_id,
            call_sid = ?identity.call_sid,
            transferred = call_state.is_transferred(),
            transfer_in_flight = call_state.transfer_in_flight(),
            "Media stream closed"
        ),
        Err(e) => warn!(
            session_id = %session_id,
            call_sid = ?identity.call_sid,
            "Media stream closed with error: {}", e
        ),
    }
}
