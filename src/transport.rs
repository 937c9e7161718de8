//! Transport boundary: broker session establishment and frame delivery.
//!
//! The core consumes exactly five transport operations/events: connect,
//! subscribe, unsubscribe, inbound message, and error/close. They are
//! expressed as the [`Transport`] and [`Session`] traits so the connection
//! task is independent of the wire; the crate ships a WebSocket
//! implementation ([`WsTransport`]) speaking the JSON envelope of
//! [`crate::models::wire`], and tests inject in-process doubles through the
//! same seam.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message},
};
use url::Url;

use crate::{
    error::{PulseLinkError, Result},
    models::{ClientMessage, ConnectionConfig, Credentials, ServerMessage},
};

type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Raw event emitted by a live broker session.
#[derive(Debug)]
pub enum SessionEvent {
    /// One published message on a subscribed topic.
    Message {
        /// Topic the message was published to.
        topic: String,
        /// Raw payload bytes.
        payload: Bytes,
    },
    /// The session failed. No further events will follow; the caller decides
    /// whether to reconnect.
    Error {
        /// Transport-reported error detail.
        message: String,
    },
    /// The session ended without a transport error.
    Closed {
        /// Close reason, when the peer supplied one.
        reason: Option<String>,
    },
}

/// A live, authenticated broker session.
#[async_trait]
pub trait Session: Send {
    /// Start delivery of messages published to `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Stop delivery for `topic`.
    async fn unsubscribe(&mut self, topic: &str) -> Result<()>;

    /// Liveness probe frame. Implementations without a ping concept may
    /// no-op and return `Ok`.
    async fn ping(&mut self) -> Result<()>;

    /// Next event from the broker. Terminal variants are [`SessionEvent::Error`]
    /// and [`SessionEvent::Closed`].
    async fn next_event(&mut self) -> SessionEvent;

    /// Best-effort graceful shutdown.
    async fn close(&mut self);
}

/// Establishes broker sessions.
///
/// Returning `Ok` means the session is connected and authenticated; the
/// caller bounds the attempt with its own timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session to the configured endpoint with the configured
    /// credentials.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>>;
}

/// Validate a broker endpoint and normalize it for the WebSocket handshake.
pub(crate) fn resolve_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint.trim()).map_err(|e| {
        PulseLinkError::Configuration(format!("Invalid endpoint '{}': {}", endpoint, e))
    })?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(PulseLinkError::Configuration(format!(
                "Unsupported endpoint scheme '{}'; expected ws:// or wss://",
                other
            )));
        }
    }

    if url.host_str().is_none() {
        return Err(PulseLinkError::Configuration(
            "Endpoint must include a host".to_string(),
        ));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(PulseLinkError::Configuration(
            "Endpoint must not embed credentials; pass them via ConnectionConfig".to_string(),
        ));
    }

    Ok(url)
}

/// WebSocket implementation of [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>> {
        let url = resolve_endpoint(&config.endpoint)?;

        let request = url.as_str().into_client_request().map_err(|e| {
            PulseLinkError::Transport(format!("Failed to build WebSocket request: {}", e))
        })?;

        log::debug!("[pulse-link] Opening WebSocket session to {}", url);
        let (mut ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| PulseLinkError::Transport(format!("Connection failed: {}", e)))?;

        send_connect_and_wait(&mut ws_stream, &config.credentials).await?;
        log::debug!("[pulse-link] Broker accepted session to {}", url);

        Ok(Box::new(WsSession { ws_stream }))
    }
}

/// Send the `connect` envelope and wait for the broker's verdict.
///
/// Tolerates control frames during the handshake; the caller bounds the wait.
async fn send_connect_and_wait(
    ws_stream: &mut WebSocketStream,
    credentials: &Credentials,
) -> Result<()> {
    let connect = ClientMessage::Connect {
        username: credentials.username.clone(),
        password: credentials.password.clone(),
        client_id: credentials.client_id.clone(),
    };
    send_envelope(ws_stream, &connect).await?;

    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::ConnAck) => return Ok(()),
                    Ok(ServerMessage::ConnError { message }) => {
                        return Err(PulseLinkError::Transport(format!(
                            "Broker refused session: {}",
                            message
                        )));
                    }
                    // Tolerate early frames (e.g. broker heartbeats) and keep
                    // waiting for the handshake reply.
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(PulseLinkError::Serialization(format!(
                            "Failed to parse handshake response: {}",
                            e
                        )));
                    }
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws_stream.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(_))) => {
                return Err(PulseLinkError::Transport(
                    "Connection closed during handshake".to_string(),
                ));
            }
            Some(Err(e)) => {
                return Err(PulseLinkError::Transport(format!(
                    "WebSocket error during handshake: {}",
                    e
                )));
            }
            None => {
                return Err(PulseLinkError::Transport(
                    "Connection closed before handshake completed".to_string(),
                ));
            }
        }
    }
}

async fn send_envelope(ws_stream: &mut WebSocketStream, message: &ClientMessage) -> Result<()> {
    let payload = serde_json::to_string(message)
        .map_err(|e| PulseLinkError::Serialization(format!("Failed to serialize frame: {}", e)))?;
    ws_stream
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| PulseLinkError::Transport(format!("Failed to send frame: {}", e)))
}

struct WsSession {
    ws_stream: WebSocketStream,
}

#[async_trait]
impl Session for WsSession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        send_envelope(
            &mut self.ws_stream,
            &ClientMessage::Subscribe {
                topic: topic.to_string(),
            },
        )
        .await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        send_envelope(
            &mut self.ws_stream,
            &ClientMessage::Unsubscribe {
                topic: topic.to_string(),
            },
        )
        .await
    }

    async fn ping(&mut self) -> Result<()> {
        self.ws_stream
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| PulseLinkError::Transport(format!("Failed to send ping: {}", e)))
    }

    async fn next_event(&mut self) -> SessionEvent {
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Publish { topic, payload }) => {
                            return SessionEvent::Message {
                                topic,
                                payload: Bytes::from(payload),
                            };
                        }
                        Ok(ServerMessage::ServerError { message }) => {
                            return SessionEvent::Error { message };
                        }
                        // Stray handshake frames after the session is live
                        Ok(_) => continue,
                        Err(e) => {
                            // A malformed envelope is not a payload decode
                            // failure; skip the frame and keep the session.
                            log::warn!("[pulse-link] Unparseable broker frame: {}", e);
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    // The envelope is text; tolerate peers that send it as
                    // binary UTF-8.
                    match std::str::from_utf8(&data) {
                        Ok(text) => match serde_json::from_str::<ServerMessage>(text) {
                            Ok(ServerMessage::Publish { topic, payload }) => {
                                return SessionEvent::Message {
                                    topic,
                                    payload: Bytes::from(payload),
                                };
                            }
                            Ok(ServerMessage::ServerError { message }) => {
                                return SessionEvent::Error { message };
                            }
                            Ok(_) => continue,
                            Err(e) => {
                                log::warn!("[pulse-link] Unparseable binary frame: {}", e);
                                continue;
                            }
                        },
                        Err(_) => {
                            log::warn!("[pulse-link] Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.ws_stream.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    return SessionEvent::Closed {
                        reason: frame.map(|f| f.reason.to_string()),
                    };
                }
                Some(Err(e)) => {
                    return SessionEvent::Error {
                        message: e.to_string(),
                    };
                }
                None => return SessionEvent::Closed { reason: None },
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws_stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_accepts_ws_and_wss() {
        assert!(resolve_endpoint("ws://localhost:9001/").is_ok());
        assert!(resolve_endpoint("wss://broker.example.com/stream").is_ok());
    }

    #[test]
    fn test_resolve_trims_whitespace() {
        assert!(resolve_endpoint("  ws://localhost:9001/  ").is_ok());
    }

    #[test]
    fn test_resolve_rejects_http_scheme() {
        let err = resolve_endpoint("http://localhost:9001/").unwrap_err();
        assert!(matches!(err, PulseLinkError::Configuration(_)));
    }

    #[test]
    fn test_resolve_rejects_missing_host() {
        assert!(resolve_endpoint("ws:///path-only").is_err());
    }

    #[test]
    fn test_resolve_rejects_embedded_credentials() {
        let err = resolve_endpoint("ws://alice:secret@broker:9001/").unwrap_err();
        assert!(matches!(err, PulseLinkError::Configuration(_)));
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(resolve_endpoint("not a url").is_err());
    }
}
