//! OpenAI Realtime API client implementation.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>&temperature=<t>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 u-law, base64 encoded, relayed untouched from the phone call
//!
//! [`OpenAIRealtime::connect`] spawns one task that owns the socket. It
//! multiplexes outbound [`ModelCommand`]s from a [`ModelLink`] with inbound
//! server events, which are parsed and forwarded on a channel. When either
//! side ends the task closes the socket, flips the link to closed and drops
//! the event sender so the consumer observes end-of-stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use super::messages::{ClientEvent, ServerEvent};
use crate::core::realtime::base::{RealtimeConfig, RealtimeError, RealtimeResult};

/// Channel capacity for outbound model commands.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound server events.
const EVENT_CHANNEL_CAPACITY: usize = 512;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Model Link
// =============================================================================

/// Command consumed by the connection task.
#[derive(Debug)]
pub enum ModelCommand {
    Event(ClientEvent),
    Close,
}

/// Cloneable handle for sending to the model connection.
///
/// `close` is idempotent: only the first call reaches the socket.
#[derive(Clone, Debug)]
pub struct ModelLink {
    tx: mpsc::Sender<ModelCommand>,
    open: Arc<AtomicBool>,
}

impl ModelLink {
    /// Create a link and the command receiver that backs it.
    ///
    /// Used by the connection task, and by tests that stand in for the model.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ModelCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                open: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queue an event for the model.
    ///
    /// Fails with [`RealtimeError::NotConnected`] once the link is closed.
    pub async fn send(&self, event: ClientEvent) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.tx.send(ModelCommand::Event(event)).await.map_err(|_| {
            self.open.store(false, Ordering::SeqCst);
            RealtimeError::NotConnected
        })
    }

    /// Close the connection. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(ModelCommand::Close).await;
        true
    }
}

/// A live model connection.
pub struct ModelConnection {
    pub link: ModelLink,
    pub events: mpsc::Receiver<ServerEvent>,
    pub task: JoinHandle<()>,
}

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client.
#[derive(Debug, Clone)]
pub struct OpenAIRealtime {
    config: RealtimeConfig,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Build the WebSocket URL with model and temperature parameters.
    pub fn build_ws_url(&self) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.config.model)
            .append_pair("temperature", &self.config.temperature.to_string());
        Ok(url)
    }

    fn build_request(&self, url: &Url) -> RealtimeResult<http::Request<()>> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(RealtimeError::InvalidConfiguration(
                    "url has no host".to_string(),
                ));
            }
        };

        http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))
    }

    /// Open the WebSocket and spawn the connection task.
    pub async fn connect(&self) -> RealtimeResult<ModelConnection> {
        let url = self.build_ws_url()?;
        let request = self.build_request(&url)?;

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RealtimeError::ConnectionFailed("connect timed out".to_string()))?
                .map_err(|e| match e {
                    tungstenite::Error::Http(response) if response.status() == 401 => {
                        RealtimeError::AuthenticationFailed("API key rejected".to_string())
                    }
                    other => RealtimeError::ConnectionFailed(other.to_string()),
                })?;

        tracing::info!(model = %self.config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (link, mut rx) = ModelLink::channel(WS_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);

        let open = link.open.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Handle outgoing messages
                    command = rx.recv() => {
                        let event = match command {
                            Some(ModelCommand::Event(event)) => event,
                            Some(ModelCommand::Close) | None => {
                                tracing::debug!("Closing OpenAI Realtime connection");
                                let _ = ws_sink.send(Message::Close(None)).await;
                                break;
                            }
                        };

                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }

                    // Handle incoming messages
                    msg = ws_stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if events_tx.send(event).await.is_err() {
                                            tracing::debug!("Event receiver dropped");
                                            let _ = ws_sink.send(Message::Close(None)).await;
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse server event: {} - {}", e, text);
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("WebSocket closed by server");
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }

            open.store(false, Ordering::SeqCst);
            tracing::debug!("OpenAI Realtime connection task finished");
        });

        Ok(ModelConnection {
            link,
            events: events_rx,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(OpenAIRealtime::new(RealtimeConfig::default()).is_err());
        assert!(OpenAIRealtime::new(config()).is_ok());
    }

    #[test]
    fn test_build_ws_url() {
        let client = OpenAIRealtime::new(config()).unwrap();
        let url = client.build_ws_url().unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-realtime&temperature=0.8"
        );
    }

    #[test]
    fn test_build_request_headers() {
        let client = OpenAIRealtime::new(config()).unwrap();
        let url = client.build_ws_url().unwrap();
        let request = client.build_request(&url).unwrap();
        assert_eq!(request.headers()["Authorization"], "Bearer sk-test");
        assert_eq!(request.headers()["Host"], "api.openai.com");
    }

    #[tokio::test]
    async fn test_link_close_is_idempotent() {
        let (link, mut rx) = ModelLink::channel(8);
        let other = link.clone();

        assert!(link.close().await);
        assert!(!other.close().await);
        assert!(!link.is_open());

        assert!(matches!(rx.recv().await, Some(ModelCommand::Close)));
        drop(link);
        drop(other);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (link, _rx) = ModelLink::channel(8);
        link.close().await;
        assert!(matches!(
            link.send(ClientEvent::ResponseCreate).await,
            Err(RealtimeError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_marks_closed_when_task_gone() {
        let (link, rx) = ModelLink::channel(8);
        drop(rx);
        assert!(link.send(ClientEvent::ResponseCreate).await.is_err());
        assert!(!link.is_open());
    }
}
