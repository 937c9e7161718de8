//! Shared test doubles: an in-process broker behind the `Transport` seam.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pulse_link::{
    ConnectionConfig, ConnectionOptions, PulseLinkClient, PulseLinkError, PulseLinkTimeouts,
    Result, Session, SessionEvent, Transport,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct BrokerInner {
    subscribe_log: Mutex<Vec<String>>,
    unsubscribe_log: Mutex<Vec<String>>,
    subscribed: Mutex<HashSet<String>>,
    connect_count: AtomicUsize,
    fail_connects: AtomicUsize,
    sessions: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

/// In-process broker double.
///
/// Records every subscribe/unsubscribe the client issues, lets tests publish
/// messages, fail connect attempts, and kill live sessions to simulate a
/// broker restart.
#[derive(Clone, Default)]
pub struct MockBroker {
    inner: Arc<BrokerInner>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport handle for injection into a client builder.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(MockTransport {
            inner: self.inner.clone(),
        })
    }

    /// Deliver a message to every live session, provided `topic` is
    /// currently subscribed. Like a real broker, unsubscribed topics are
    /// not delivered.
    pub fn publish(&self, topic: &str, payload: &[u8]) {
        if !self.inner.subscribed.lock().unwrap().contains(topic) {
            return;
        }
        for tx in self.inner.sessions.lock().unwrap().iter() {
            let _ = tx.send(SessionEvent::Message {
                topic: topic.to_string(),
                payload: Bytes::copy_from_slice(payload),
            });
        }
    }

    /// Every subscribe call the broker has seen, in order.
    pub fn subscribe_log(&self) -> Vec<String> {
        self.inner.subscribe_log.lock().unwrap().clone()
    }

    /// Every unsubscribe call the broker has seen, in order.
    pub fn unsubscribe_log(&self) -> Vec<String> {
        self.inner.unsubscribe_log.lock().unwrap().clone()
    }

    /// Currently subscribed topics.
    pub fn subscribed(&self) -> HashSet<String> {
        self.inner.subscribed.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connect_count.load(Ordering::SeqCst)
    }

    /// Make the next `n` connect attempts fail with "connection refused".
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Kill all live sessions, simulating a broker restart.
    pub fn drop_sessions(&self) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        for tx in sessions.drain(..) {
            let _ = tx.send(SessionEvent::Closed {
                reason: Some("broker restart".to_string()),
            });
        }
        self.inner.subscribed.lock().unwrap().clear();
    }
}

struct MockTransport {
    inner: Arc<BrokerInner>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Session>> {
        self.inner.connect_count.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .inner
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(PulseLinkError::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.sessions.lock().unwrap().push(tx);
        Ok(Box::new(MockSession {
            inner: self.inner.clone(),
            events: rx,
        }))
    }
}

struct MockSession {
    inner: Arc<BrokerInner>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

#[async_trait]
impl Session for MockSession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.inner
            .subscribe_log
            .lock()
            .unwrap()
            .push(topic.to_string());
        self.inner
            .subscribed
            .lock()
            .unwrap()
            .insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.inner
            .unsubscribe_log
            .lock()
            .unwrap()
            .push(topic.to_string());
        self.inner.subscribed.lock().unwrap().remove(topic);
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> SessionEvent {
        self.events
            .recv()
            .await
            .unwrap_or(SessionEvent::Closed { reason: None })
    }

    async fn close(&mut self) {}
}

/// Transport whose connect attempt never resolves; for probe bound tests.
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Session>> {
        std::future::pending::<()>().await;
        unreachable!("pending() never resolves")
    }
}

/// Client wired to the mock broker with test-friendly timing.
pub fn client_with(broker: &MockBroker) -> PulseLinkClient {
    let _ = env_logger::builder().is_test(true).try_init();
    PulseLinkClient::builder()
        .endpoint("ws://broker.test:9001/")
        .transport(broker.transport())
        .timeouts(PulseLinkTimeouts::fast())
        .connection_options(
            ConnectionOptions::new()
                .with_reconnect_delay_ms(10)
                .with_max_reconnect_delay_ms(50),
        )
        .build()
        .expect("mock-backed client must build")
}

/// Poll `condition` until it holds or a 2-second deadline passes.
pub async fn wait_for(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            description
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
