//! JSON wire envelope spoken by the WebSocket transport.
//!
//! Control frames (connect, subscribe, unsubscribe) and data frames (publish)
//! are JSON text messages tagged by `type`. Publish payloads are arbitrary
//! bytes and travel base64-encoded.

use serde::{Deserialize, Serialize};

/// Messages sent from the client to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session handshake carrying pass-through credentials.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    /// Start delivery of messages published to `topic`.
    Subscribe { topic: String },
    /// Stop delivery for `topic`.
    Unsubscribe { topic: String },
}

/// Messages sent from the broker to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted; the session is live.
    ConnAck,
    /// Handshake rejected.
    ConnError {
        /// Why the broker refused the session.
        message: String,
    },
    /// One message published on a subscribed topic.
    Publish {
        /// Topic the message was published to.
        topic: String,
        /// Raw payload bytes, base64 on the wire.
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
    },
    /// Broker-reported session error.
    ServerError {
        /// Error detail.
        message: String,
    },
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
