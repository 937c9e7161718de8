//! Main pulse-link client with builder pattern.
//!
//! One [`PulseLinkClient`] represents one data-source instance: a broker
//! endpoint plus credentials, a lazily established shared connection, and
//! any number of streaming queries issued against it.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{
    connection::{ConnectionState, SharedConnection},
    error::{PulseLinkError, Result},
    event_handlers::EventHandlers,
    models::{ConnectionConfig, ConnectionOptions, Credentials, HealthReport, QuerySpec},
    stream::{QueryStream, UPDATE_CHANNEL_CAPACITY},
    timeouts::PulseLinkTimeouts,
    transport::{resolve_endpoint, Transport, WsTransport},
};

/// Streaming pub/sub client.
///
/// Use [`PulseLinkClientBuilder`] to construct instances with custom
/// configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use pulse_link::{Credentials, PulseLinkClient, QuerySpec, ValueEncoding};
///
/// # async fn example() -> pulse_link::Result<()> {
/// let client = PulseLinkClient::builder()
///     .endpoint("ws://localhost:9001/")
///     .credentials(Credentials::basic("alice", "secret"))
///     .build()?;
///
/// let mut stream = client
///     .query(vec![
///         QuerySpec::new("A", "sensors/temp").with_json_path("value"),
///         QuerySpec::new("B", "sensors/raw").with_value_encoding(ValueEncoding::Float32),
///     ])
///     .await?;
///
/// while let Some(update) = stream.next().await {
///     println!("{}: {:?}", update.ref_id, update.points.last());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PulseLinkClient {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    timeouts: PulseLinkTimeouts,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
    /// Shared connection, established on first use. The mutex also
    /// serializes establishment, so concurrent query() calls observe the
    /// same attempt instead of issuing redundant connects.
    connection: Arc<Mutex<Option<Arc<SharedConnection>>>>,
}

impl PulseLinkClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> PulseLinkClientBuilder {
        PulseLinkClientBuilder::new()
    }

    /// Start streaming the given queries.
    ///
    /// Registers every spec on the shared connection (establishing it on
    /// first use) and returns one merged stream of snapshot updates. An
    /// invalid spec does not fail the call; the error is delivered on that
    /// query's output status.
    pub async fn query(&self, specs: Vec<QuerySpec>) -> Result<QueryStream> {
        let connection = self.shared_connection().await?;

        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let mut attached = Vec::with_capacity(specs.len());
        for spec in specs {
            let ref_id = spec.ref_id.clone();
            if let Some(generation) = connection.attach(spec, update_tx.clone()).await? {
                attached.push((ref_id, generation));
            }
        }

        Ok(QueryStream::new(
            update_rx,
            attached,
            connection.command_sender(),
        ))
    }

    /// Probe the broker.
    ///
    /// Opens a dedicated probe session and reports success iff it is
    /// established within the configured `health_check_timeout`. The probe
    /// session is always closed; a transport failure or timeout is returned
    /// as an error report, never as an `Err`.
    pub async fn health_check(&self) -> HealthReport {
        let timeout = self.timeouts.health_check_timeout;
        match tokio::time::timeout(timeout, self.transport.connect(&self.config)).await {
            Ok(Ok(mut session)) => {
                session.close().await;
                HealthReport::success(format!("Connected to {}", self.config.endpoint))
            }
            Ok(Err(e)) => HealthReport::error(format!(
                "Connection to {} failed: {}",
                self.config.endpoint, e
            )),
            Err(_) => HealthReport::error(format!(
                "Connection to {} timed out after {:?}",
                self.config.endpoint, timeout
            )),
        }
    }

    /// Current lifecycle state of the shared connection.
    ///
    /// [`ConnectionState::Disconnected`] when no query has been issued yet.
    pub async fn connection_state(&self) -> ConnectionState {
        let guard = self.connection.lock().await;
        match guard.as_ref() {
            Some(connection) => connection.state(),
            None => ConnectionState::Disconnected,
        }
    }

    /// Tear the shared connection down.
    ///
    /// Live streams end; a later `query()` establishes a fresh connection.
    pub async fn disconnect(&self) {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.take() {
            connection.shutdown().await;
        }
    }

    /// Get the configured timeouts.
    pub fn timeouts(&self) -> &PulseLinkTimeouts {
        &self.timeouts
    }

    async fn shared_connection(&self) -> Result<Arc<SharedConnection>> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }

        let connection = Arc::new(
            SharedConnection::connect(
                self.transport.clone(),
                self.config.clone(),
                self.timeouts.clone(),
                self.options.clone(),
                self.event_handlers.clone(),
            )
            .await,
        );
        *guard = Some(connection.clone());
        Ok(connection)
    }
}

/// Builder for configuring [`PulseLinkClient`] instances.
pub struct PulseLinkClientBuilder {
    endpoint: Option<String>,
    credentials: Credentials,
    timeouts: PulseLinkTimeouts,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
    transport: Option<Arc<dyn Transport>>,
}

impl PulseLinkClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: None,
            credentials: Credentials::none(),
            timeouts: PulseLinkTimeouts::default(),
            options: ConnectionOptions::default(),
            event_handlers: EventHandlers::new(),
            transport: None,
        }
    }

    /// Set the broker endpoint URL (`ws://` or `wss://`). Required.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set pass-through credentials for the broker handshake.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set timeout configuration for connect attempts and health probes.
    pub fn timeouts(mut self, timeouts: PulseLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set reconnection behavior of the shared connection.
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Register connection lifecycle event handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Override the transport implementation.
    ///
    /// Defaults to [`WsTransport`]. Primarily a seam for tests and
    /// alternative wire protocols.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    ///
    /// Fails when the endpoint is missing or malformed.
    pub fn build(self) -> Result<PulseLinkClient> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| PulseLinkError::Configuration("endpoint is required".to_string()))?;

        // Reject malformed endpoints at build time; the default transport
        // would only discover them on the first connect.
        if self.transport.is_none() {
            resolve_endpoint(&endpoint)?;
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport::new()));

        Ok(PulseLinkClient {
            config: ConnectionConfig {
                endpoint,
                credentials: self.credentials,
            },
            transport,
            timeouts: self.timeouts,
            options: self.options,
            event_handlers: self.event_handlers,
            connection: Arc::new(Mutex::new(None)),
        })
    }
}
