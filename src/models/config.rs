//! Connection parameters for one data-source instance.

use serde::{Deserialize, Serialize};

/// Authentication material passed through to the broker.
///
/// The client does not interpret these fields; they are forwarded verbatim in
/// the session handshake. All fields are optional; anonymous brokers accept
/// an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username for the broker handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for the broker handshake.
    /// Never logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Client identifier presented to the broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Credentials {
    /// No authentication.
    pub fn none() -> Self {
        Self::default()
    }

    /// Username/password authentication.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            client_id: None,
        }
    }

    /// Set the client identifier.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Whether no credential field is set.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.client_id.is_none()
    }
}

/// Endpoint and credentials for one broker connection.
///
/// Owned by the client instance and shared by every query issued against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Broker endpoint URL (`ws://` or `wss://`).
    pub endpoint: String,

    /// Pass-through authentication material.
    #[serde(default)]
    pub credentials: Credentials,
}

impl ConnectionConfig {
    /// Create a config for `endpoint` with no credentials.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: Credentials::none(),
        }
    }

    /// Attach credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}
