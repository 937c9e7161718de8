//! Health probe tests: success, refusal, and the bounded-wait guarantee.

mod common;

use common::{client_with, HangingTransport, MockBroker};
use pulse_link::{HealthStatus, PulseLinkClient, PulseLinkTimeouts};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_health_check_succeeds_against_live_broker() {
    let broker = MockBroker::new();
    let client = client_with(&broker);

    let report = client.health_check().await;
    assert_eq!(report.status, HealthStatus::Success);
    assert!(report.is_success());
    assert_eq!(broker.connect_count(), 1, "the probe opens its own session");
}

#[tokio::test]
async fn test_health_check_reports_refused_connection() {
    let broker = MockBroker::new();
    broker.fail_next_connects(1);
    let client = client_with(&broker);

    let report = client.health_check().await;
    assert_eq!(report.status, HealthStatus::Error);
    assert!(
        report.message.contains("connection refused"),
        "the transport's reported error must be surfaced: {}",
        report.message
    );
}

#[tokio::test]
async fn test_health_check_cannot_hang() {
    let client = PulseLinkClient::builder()
        .endpoint("ws://broker.test:9001/")
        .transport(Arc::new(HangingTransport))
        .timeouts(
            PulseLinkTimeouts::builder()
                .health_check_timeout(Duration::from_millis(200))
                .build(),
        )
        .build()
        .unwrap();

    let start = Instant::now();
    let report = client.health_check().await;
    let elapsed = start.elapsed();

    assert_eq!(report.status, HealthStatus::Error);
    assert!(
        report.message.contains("timed out"),
        "message: {}",
        report.message
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "the probe must respect its bound, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_health_check_does_not_disturb_streaming() {
    let broker = MockBroker::new();
    let client = client_with(&broker);

    let _stream = client
        .query(vec![pulse_link::QuerySpec::new("A", "t").with_json_path("v")])
        .await
        .unwrap();
    common::wait_for("subscription", || broker.subscribed().contains("t")).await;

    let report = client.health_check().await;
    assert!(report.is_success());
    assert!(
        broker.subscribed().contains("t"),
        "the probe session must not affect live subscriptions"
    );
}
