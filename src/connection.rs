//! Shared broker connection manager.
//!
//! One background task owns the transport session, the refcounted topic
//! table, and every per-query decode pipeline, so all subscription state is
//! mutated from a single place. Handles:
//!
//! - Single session shared by all queries of one client instance
//! - Subscribe/unsubscribe exactly on topic refcount edges
//! - Per-topic message routing into per-query pipelines
//!   (decode → ring-buffer append → snapshot emission)
//! - Automatic reconnection with exponential backoff
//! - Replay of all refcounted topics after reconnect
//! - Keepalive pings with a pong deadline
//! - Connection lifecycle events (`on_connect`, `on_disconnect`, `on_error`)

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

use crate::{
    decode::decode_sample,
    error::{PulseLinkError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{ConnectionConfig, ConnectionOptions, QuerySpec, StreamUpdate},
    series::{Sample, Series},
    timeouts::PulseLinkTimeouts,
    topics::TopicTable,
    transport::{Session, SessionEvent, Transport},
};

/// Maximum sleep duration that won't overflow `Instant + Duration`.
/// ~100 years is far enough into the future to be effectively "never".
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Capacity of the command channel into the connection task.
const CMD_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle states of one client instance.
///
/// Transitions are driven only by transport lifecycle events, never by
/// query-level code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and none being established.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A session is live.
    Connected,
    /// The session failed; automatic reconnection may be pending.
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Faulted => write!(f, "faulted"),
        }
    }
}

/// Current time in millis since the Unix epoch.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
pub(crate) enum ConnCmd {
    /// Register a streaming query. Replaces any live pipeline with the same
    /// `ref_id` (a changed topic is a re-subscription, handled atomically
    /// within this one command).
    Attach {
        spec: QuerySpec,
        update_tx: mpsc::Sender<StreamUpdate>,
        /// `Ok(Some(generation))` when a pipeline was registered,
        /// `Ok(None)` when the spec was invalid (the error was surfaced on
        /// the query's own output stream).
        result_tx: oneshot::Sender<Result<Option<u64>>>,
    },
    /// Remove a query pipeline. The generation tag guards against a stale
    /// detach from a superseded stream removing a re-registered query that
    /// reused the same `ref_id`.
    Detach { ref_id: String, generation: u64 },
    /// Gracefully tear the connection down.
    Shutdown,
}

// ── Per-query pipeline state ────────────────────────────────────────────────

/// Decode configuration, retained window, and output channel of one query.
struct QueryPipeline {
    spec: QuerySpec,
    series: Series,
    update_tx: mpsc::Sender<StreamUpdate>,
    generation: u64,
}

/// Transport actions required after registering a query.
struct AttachOutcome {
    generation: u64,
    subscribe_topic: Option<String>,
    unsubscribe_topic: Option<String>,
}

/// Register (or replace) a query pipeline and update topic refcounts.
///
/// The new topic is acquired before the superseded one is released so a
/// resubmission with an unchanged topic never flaps through an
/// unsubscribe/subscribe pair.
fn register_query(
    pipelines: &mut HashMap<String, QueryPipeline>,
    topics: &mut TopicTable,
    next_generation: &mut u64,
    spec: QuerySpec,
    update_tx: mpsc::Sender<StreamUpdate>,
) -> AttachOutcome {
    let generation = *next_generation;
    *next_generation += 1;

    let subscribe_topic = topics.acquire(&spec.topic).then(|| spec.topic.clone());

    let mut unsubscribe_topic = None;
    if let Some(previous) = pipelines.remove(&spec.ref_id) {
        log::debug!(
            "[pulse-link] Replacing query '{}' (topic '{}' -> '{}')",
            spec.ref_id,
            previous.spec.topic,
            spec.topic
        );
        if topics.release(&previous.spec.topic) {
            unsubscribe_topic = Some(previous.spec.topic);
        }
    }

    let series = Series::new(spec.series_capacity);
    pipelines.insert(
        spec.ref_id.clone(),
        QueryPipeline {
            spec,
            series,
            update_tx,
            generation,
        },
    );

    AttachOutcome {
        generation,
        subscribe_topic,
        unsubscribe_topic,
    }
}

/// Remove a query pipeline if the generation matches; returns the topic to
/// unsubscribe when its refcount dropped to zero.
fn remove_query(
    pipelines: &mut HashMap<String, QueryPipeline>,
    topics: &mut TopicTable,
    ref_id: &str,
    generation: u64,
) -> Option<String> {
    match pipelines.get(ref_id) {
        Some(pipeline) if pipeline.generation == generation => {}
        Some(pipeline) => {
            log::debug!(
                "[pulse-link] Ignoring stale detach for '{}' (gen={}, current={})",
                ref_id,
                generation,
                pipeline.generation
            );
            return None;
        }
        None => return None,
    }

    let pipeline = pipelines.remove(ref_id)?;
    topics.release(&pipeline.spec.topic).then(|| pipeline.spec.topic)
}

/// Decode one published message into every pipeline watching its topic and
/// emit a fresh full-window snapshot per pipeline.
///
/// A decode failure degrades to a null sample for that instant only.
async fn dispatch_message(
    pipelines: &mut HashMap<String, QueryPipeline>,
    topic: &str,
    payload: &[u8],
) {
    let timestamp_ms = now_ms();
    for pipeline in pipelines.values_mut().filter(|p| p.spec.topic == topic) {
        let value = match decode_sample(payload, &pipeline.spec) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(
                    "[pulse-link] Decode failed for query '{}' on topic '{}': {}",
                    pipeline.spec.ref_id,
                    topic,
                    e
                );
                None
            }
        };

        pipeline.series.append(Sample::new(timestamp_ms, value));
        let update = StreamUpdate::streaming(&pipeline.spec.ref_id, pipeline.series.snapshot());
        if pipeline.update_tx.send(update).await.is_err() {
            // Consumer dropped its stream; the detach from Drop will clean up.
            log::debug!(
                "[pulse-link] Consumer gone for query '{}'",
                pipeline.spec.ref_id
            );
        }
    }
}

fn set_state(state: &Arc<RwLock<ConnectionState>>, new_state: ConnectionState) {
    let mut guard = match state.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *guard != new_state {
        log::debug!("[pulse-link] Connection state: {} -> {}", *guard, new_state);
        *guard = new_state;
    }
}

// ── SharedConnection (public handle) ────────────────────────────────────────

/// Handle to the background connection task of one client instance.
///
/// Attach/detach calls send commands to the task that owns the session.
pub(crate) struct SharedConnection {
    cmd_tx: mpsc::Sender<ConnCmd>,
    state: Arc<RwLock<ConnectionState>>,
    _task: JoinHandle<()>,
}

impl SharedConnection {
    /// Spawn the connection task and wait for its initial connect attempt.
    ///
    /// An initial failure is not fatal: the task keeps running and
    /// auto-reconnects (when enabled), and queued queries are replayed once
    /// a session is established.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
        timeouts: PulseLinkTimeouts,
        options: ConnectionOptions,
        event_handlers: EventHandlers,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let (ready_tx, ready_rx) = oneshot::channel();

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            connection_task(
                cmd_rx,
                transport,
                config,
                timeouts,
                options,
                event_handlers,
                task_state,
                ready_tx,
            )
            .await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!("[pulse-link] Initial connection failed: {}", e);
            }
            Err(_) => {
                log::warn!("[pulse-link] Connection task exited before signalling readiness");
            }
        }

        Self {
            cmd_tx,
            state,
            _task: task,
        }
    }

    /// Register a query and return its generation tag, or `None` when the
    /// spec was invalid and the error went to the query's own stream.
    pub async fn attach(
        &self,
        spec: QuerySpec,
        update_tx: mpsc::Sender<StreamUpdate>,
    ) -> Result<Option<u64>> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Attach {
                spec,
                update_tx,
                result_tx,
            })
            .await
            .map_err(|_| {
                PulseLinkError::Transport("Connection task is not running".to_string())
            })?;

        result_rx.await.map_err(|_| {
            PulseLinkError::Transport("Connection task exited before confirming query".to_string())
        })?
    }

    /// Clone the command sender for detach-on-drop in stream handles.
    pub fn command_sender(&self) -> mpsc::Sender<ConnCmd> {
        self.cmd_tx.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Gracefully tear the connection down.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ConnCmd::Shutdown).await;
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        // Best-effort shutdown signal.
        let _ = self.cmd_tx.try_send(ConnCmd::Shutdown);
    }
}

// ── Background connection task ──────────────────────────────────────────────

/// Bound a connect attempt with the configured connection timeout.
async fn establish(
    transport: &Arc<dyn Transport>,
    config: &ConnectionConfig,
    timeouts: &PulseLinkTimeouts,
    event_handlers: &EventHandlers,
) -> Result<Box<dyn Session>> {
    log::debug!("[pulse-link] Connecting to {}", config.endpoint);

    let result = if !PulseLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        tokio::time::timeout(timeouts.connection_timeout, transport.connect(config)).await
    } else {
        Ok(transport.connect(config).await)
    };

    match result {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(e)) => {
            event_handlers.emit_error(ConnectionError::new(e.to_string(), true));
            Err(e)
        }
        Err(_) => {
            let message = format!("Connection timeout ({:?})", timeouts.connection_timeout);
            event_handlers.emit_error(ConnectionError::new(&message, true));
            Err(PulseLinkError::Timeout(message))
        }
    }
}

/// The main background task managing the shared broker session.
///
/// Lifecycle:
/// 1. Establish a session (Connecting → Connected)
/// 2. Event loop: route published messages + process commands + keepalive
/// 3. On fault: Faulted, then reconnect with exponential backoff
/// 4. On reconnect: replay every topic with refcount > 0
#[allow(clippy::too_many_arguments)]
async fn connection_task(
    mut cmd_rx: mpsc::Receiver<ConnCmd>,
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    timeouts: PulseLinkTimeouts,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
    state: Arc<RwLock<ConnectionState>>,
    ready_tx: oneshot::Sender<Result<()>>,
) {
    let mut topics = TopicTable::new();
    let mut pipelines: HashMap<String, QueryPipeline> = HashMap::new();
    let mut session: Option<Box<dyn Session>> = None;
    let mut shutdown_requested = false;
    // Monotonic tag for pipelines; guards stale detaches after ref_id reuse.
    let mut next_generation: u64 = 1;
    let mut reconnect_attempts: u32 = 0;
    let mut reconnect_enabled = options.auto_reconnect;
    let mut attach_refusal = "Not connected and auto-reconnect is disabled";

    // Keepalive configuration
    let has_keepalive = !timeouts.keepalive_interval.is_zero();
    let keepalive_dur = if has_keepalive {
        timeouts.keepalive_interval
    } else {
        FAR_FUTURE
    };
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    // Pong deadline: after a Ping, some frame must arrive within this window.
    let has_pong_timeout = has_keepalive && !timeouts.pong_timeout.is_zero();
    let mut awaiting_pong = false;
    let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

    // Initial connection attempt
    set_state(&state, ConnectionState::Connecting);
    match establish(&transport, &config, &timeouts, &event_handlers).await {
        Ok(stream) => {
            session = Some(stream);
            set_state(&state, ConnectionState::Connected);
            event_handlers.emit_connect();
            idle_deadline = TokioInstant::now() + keepalive_dur;
            let _ = ready_tx.send(Ok(()));
        }
        Err(e) => {
            set_state(&state, ConnectionState::Faulted);
            let _ = ready_tx.send(Err(e));
        }
    }

    loop {
        if shutdown_requested {
            if let Some(mut stream) = session.take() {
                for topic in topics.active_topics() {
                    let _ = stream.unsubscribe(&topic).await;
                }
                stream.close().await;
                event_handlers.emit_disconnect(DisconnectReason::new("Client disconnected"));
            }
            set_state(&state, ConnectionState::Disconnected);
            return;
        }

        if let Some(ref mut stream) = session {
            // Live session: multiplex events, commands, keepalive, pong check
            let idle_sleep = tokio::time::sleep_until(idle_deadline);
            tokio::pin!(idle_sleep);

            let pong_sleep = tokio::time::sleep_until(pong_deadline);
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                // Pong deadline passed: no frame since our Ping.
                _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                    log::warn!(
                        "[pulse-link] Pong timeout ({:?}), treating session as dead",
                        timeouts.pong_timeout,
                    );
                    event_handlers.emit_disconnect(DisconnectReason::new(format!(
                        "Pong timeout ({:?}), broker unresponsive",
                        timeouts.pong_timeout,
                    )));
                    set_state(&state, ConnectionState::Faulted);
                    awaiting_pong = false;
                    session = None;
                    continue;
                }

                // Commands from the public API
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnCmd::Attach { spec, update_tx, result_tx }) => {
                            if let Err(message) = spec.validate() {
                                let _ = update_tx
                                    .send(StreamUpdate::error(&spec.ref_id, &message))
                                    .await;
                                let _ = result_tx.send(Ok(None));
                                continue;
                            }

                            let outcome = register_query(
                                &mut pipelines,
                                &mut topics,
                                &mut next_generation,
                                spec,
                                update_tx,
                            );
                            if let Some(topic) = outcome.subscribe_topic {
                                log::debug!("[pulse-link] Subscribing to '{}'", topic);
                                if let Err(e) = stream.subscribe(&topic).await {
                                    log::warn!("[pulse-link] Subscribe '{}' failed: {}", topic, e);
                                    event_handlers.emit_error(
                                        ConnectionError::new(e.to_string(), true),
                                    );
                                }
                            }
                            if let Some(topic) = outcome.unsubscribe_topic {
                                log::debug!("[pulse-link] Unsubscribing from '{}'", topic);
                                if let Err(e) = stream.unsubscribe(&topic).await {
                                    log::warn!(
                                        "[pulse-link] Unsubscribe '{}' failed: {}", topic, e,
                                    );
                                }
                            }
                            let _ = result_tx.send(Ok(Some(outcome.generation)));
                        }
                        Some(ConnCmd::Detach { ref_id, generation }) => {
                            if let Some(topic) =
                                remove_query(&mut pipelines, &mut topics, &ref_id, generation)
                            {
                                log::debug!("[pulse-link] Unsubscribing from '{}'", topic);
                                if let Err(e) = stream.unsubscribe(&topic).await {
                                    log::warn!(
                                        "[pulse-link] Unsubscribe '{}' failed: {}", topic, e,
                                    );
                                }
                            }
                        }
                        Some(ConnCmd::Shutdown) | None => {
                            shutdown_requested = true;
                            continue;
                        }
                    }
                }

                // Keepalive ping
                _ = &mut idle_sleep, if has_keepalive && !awaiting_pong => {
                    if let Err(e) = stream.ping().await {
                        log::warn!("[pulse-link] Keepalive ping failed: {}", e);
                        event_handlers.emit_disconnect(DisconnectReason::new(format!(
                            "Keepalive ping failed: {}", e,
                        )));
                        set_state(&state, ConnectionState::Faulted);
                        session = None;
                        continue;
                    }
                    if has_pong_timeout {
                        awaiting_pong = true;
                        pong_deadline = TokioInstant::now() + timeouts.pong_timeout;
                    }
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                }

                // Transport events
                event = stream.next_event() => {
                    // Any frame proves the session is alive.
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    if awaiting_pong {
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                    }

                    match event {
                        SessionEvent::Message { topic, payload } => {
                            event_handlers.emit_message(&topic, &payload);
                            dispatch_message(&mut pipelines, &topic, &payload).await;
                        }
                        SessionEvent::Error { message } => {
                            event_handlers.emit_error(ConnectionError::new(&message, true));
                            event_handlers.emit_disconnect(DisconnectReason::new(format!(
                                "Transport error: {}", message,
                            )));
                            set_state(&state, ConnectionState::Faulted);
                            session = None;
                            continue;
                        }
                        SessionEvent::Closed { reason } => {
                            let reason =
                                reason.unwrap_or_else(|| "Session ended".to_string());
                            event_handlers.emit_disconnect(DisconnectReason::new(reason));
                            set_state(&state, ConnectionState::Faulted);
                            session = None;
                            continue;
                        }
                    }
                }
            }
        } else {
            // ── No session: reconnect with backoff, or serve commands only ──

            if !reconnect_enabled {
                match cmd_rx.recv().await {
                    Some(ConnCmd::Attach { result_tx, .. }) => {
                        let _ = result_tx
                            .send(Err(PulseLinkError::Transport(attach_refusal.to_string())));
                    }
                    Some(ConnCmd::Detach { ref_id, generation }) => {
                        let _ = remove_query(&mut pipelines, &mut topics, &ref_id, generation);
                    }
                    Some(ConnCmd::Shutdown) | None => {
                        shutdown_requested = true;
                    }
                }
                continue;
            }

            let attempt = reconnect_attempts;
            reconnect_attempts += 1;

            if let Some(max) = options.max_reconnect_attempts {
                if attempt >= max {
                    log::warn!("[pulse-link] Max reconnection attempts ({}) reached", max);
                    event_handlers.emit_error(ConnectionError::new(
                        format!("Max reconnection attempts ({}) reached", max),
                        false,
                    ));
                    // Surface retry exhaustion on every live query stream,
                    // then refuse further attaches.
                    for (_ref_id, pipeline) in pipelines.drain() {
                        let _ = pipeline.update_tx.try_send(StreamUpdate::error(
                            &pipeline.spec.ref_id,
                            "Reconnection attempts exhausted",
                        ));
                    }
                    reconnect_enabled = false;
                    attach_refusal = "Reconnection attempts exhausted";
                    continue;
                }
            }

            let delay = options.backoff_delay_ms(attempt);
            log::info!(
                "[pulse-link] Reconnecting in {}ms (attempt {})",
                delay,
                attempt + 1
            );

            // Wait out the backoff while still serving commands.
            let sleep_fut = tokio::time::sleep(Duration::from_millis(delay));
            tokio::pin!(sleep_fut);

            let mut got_shutdown = false;
            loop {
                tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(ConnCmd::Attach { spec, update_tx, result_tx }) => {
                                if let Err(message) = spec.validate() {
                                    let _ = update_tx
                                        .send(StreamUpdate::error(&spec.ref_id, &message))
                                        .await;
                                    let _ = result_tx.send(Ok(None));
                                    continue;
                                }
                                // Queue the pipeline; its topic is replayed
                                // once a session is re-established.
                                let outcome = register_query(
                                    &mut pipelines,
                                    &mut topics,
                                    &mut next_generation,
                                    spec,
                                    update_tx,
                                );
                                let _ = result_tx.send(Ok(Some(outcome.generation)));
                            }
                            Some(ConnCmd::Detach { ref_id, generation }) => {
                                let _ = remove_query(&mut pipelines, &mut topics, &ref_id, generation);
                            }
                            Some(ConnCmd::Shutdown) | None => {
                                got_shutdown = true;
                                break;
                            }
                        }
                    }
                    _ = &mut sleep_fut => {
                        break;
                    }
                }
            }

            if got_shutdown {
                shutdown_requested = true;
                continue;
            }

            set_state(&state, ConnectionState::Connecting);
            match establish(&transport, &config, &timeouts, &event_handlers).await {
                Ok(mut stream) => {
                    log::info!("[pulse-link] Reconnection successful");
                    reconnect_attempts = 0;
                    set_state(&state, ConnectionState::Connected);
                    event_handlers.emit_connect();

                    // Replay every topic still held by an active query.
                    for topic in topics.active_topics() {
                        log::debug!("[pulse-link] Replaying subscription to '{}'", topic);
                        if let Err(e) = stream.subscribe(&topic).await {
                            log::warn!(
                                "[pulse-link] Replaying subscription '{}' failed: {}",
                                topic,
                                e
                            );
                            event_handlers.emit_error(ConnectionError::new(e.to_string(), true));
                        }
                    }

                    session = Some(stream);
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;
                }
                Err(e) => {
                    set_state(&state, ConnectionState::Faulted);
                    log::warn!(
                        "[pulse-link] Reconnection attempt {} failed: {}",
                        attempt + 1,
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StreamStatus, ValueEncoding};

    fn update_channel() -> (mpsc::Sender<StreamUpdate>, mpsc::Receiver<StreamUpdate>) {
        mpsc::channel(16)
    }

    #[test]
    fn test_register_first_query_subscribes_topic() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, _rx) = update_channel();

        let outcome = register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "sensors/temp"),
            tx,
        );

        assert_eq!(outcome.generation, 1);
        assert_eq!(outcome.subscribe_topic.as_deref(), Some("sensors/temp"));
        assert_eq!(outcome.unsubscribe_topic, None);
        assert!(pipelines.contains_key("A"));
    }

    #[test]
    fn test_register_second_query_same_topic_does_not_resubscribe() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, _rx) = update_channel();

        register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "shared"),
            tx.clone(),
        );
        let outcome = register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("B", "shared"),
            tx,
        );

        assert_eq!(outcome.subscribe_topic, None);
        assert_eq!(pipelines.len(), 2);
    }

    #[test]
    fn test_retopic_is_atomic_and_spares_siblings() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, _rx) = update_channel();

        register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "old"),
            tx.clone(),
        );
        register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("B", "keep"),
            tx.clone(),
        );

        // Resubmit A with a new topic: old released, new subscribed, B intact
        let outcome = register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "new"),
            tx,
        );

        assert_eq!(outcome.subscribe_topic.as_deref(), Some("new"));
        assert_eq!(outcome.unsubscribe_topic.as_deref(), Some("old"));
        assert_eq!(
            topics.active_topics(),
            vec!["keep".to_string(), "new".to_string()]
        );
    }

    #[test]
    fn test_retopic_with_unchanged_topic_does_not_flap() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, _rx) = update_channel();

        register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "same"),
            tx.clone(),
        );
        let outcome = register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "same"),
            tx,
        );

        // Neither a subscribe nor an unsubscribe may be issued
        assert_eq!(outcome.subscribe_topic, None);
        assert_eq!(outcome.unsubscribe_topic, None);
        assert_eq!(topics.active_topics(), vec!["same".to_string()]);
    }

    #[test]
    fn test_stale_detach_is_ignored() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, _rx) = update_channel();

        let first = register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "t"),
            tx.clone(),
        );
        let second = register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "t"),
            tx,
        );

        // Detach from the superseded stream must not remove the live pipeline
        assert_eq!(
            remove_query(&mut pipelines, &mut topics, "A", first.generation),
            None
        );
        assert!(pipelines.contains_key("A"));

        // The live stream's detach removes it and releases the topic
        assert_eq!(
            remove_query(&mut pipelines, &mut topics, "A", second.generation),
            Some("t".to_string())
        );
        assert!(pipelines.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_appends_and_emits_snapshot() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, mut rx) = update_channel();

        register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "t").with_value_encoding(ValueEncoding::Float32),
            tx,
        );

        dispatch_message(&mut pipelines, "t", &[0x42, 0x48, 0x00, 0x00]).await;
        dispatch_message(&mut pipelines, "other", b"ignored").await;

        let update = rx.try_recv().expect("one update expected");
        assert_eq!(update.ref_id, "A");
        assert_eq!(update.status, StreamStatus::Streaming);
        assert_eq!(update.points.len(), 1);
        assert_eq!(update.points[0].value, Some(50.0));
        assert!(rx.try_recv().is_err(), "unmatched topic must not emit");
    }

    #[tokio::test]
    async fn test_dispatch_decode_failure_yields_null_sample() {
        let mut pipelines = HashMap::new();
        let mut topics = TopicTable::new();
        let mut next_generation = 1;
        let (tx, mut rx) = update_channel();

        register_query(
            &mut pipelines,
            &mut topics,
            &mut next_generation,
            QuerySpec::new("A", "t").with_json_path("a.b"),
            tx,
        );

        dispatch_message(&mut pipelines, "t", br#"{"a":{"b":4}}"#).await;
        dispatch_message(&mut pipelines, "t", b"not json").await;
        dispatch_message(&mut pipelines, "t", br#"{"a":{"b":6}}"#).await;

        let _ = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(second.points[1].value, None, "decode failure -> null sample");
        let third = rx.try_recv().unwrap();
        assert_eq!(
            third.points.iter().map(|p| p.value).collect::<Vec<_>>(),
            vec![Some(4.0), None, Some(6.0)],
            "history must survive a decode failure"
        );
    }
}
