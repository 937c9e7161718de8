//! Connection lifecycle tests: automatic reconnection, subscription replay,
//! and retained history across transport faults.

mod common;

use common::{client_with, wait_for, MockBroker};
use pulse_link::{
    ConnectionOptions, PulseLinkClient, PulseLinkTimeouts, QuerySpec, StreamStatus, ValueEncoding,
};
use std::time::Duration;

#[tokio::test]
async fn test_reconnect_replays_subscribed_topics() {
    let broker = MockBroker::new();
    let client = client_with(&broker);

    let _stream = client
        .query(vec![QuerySpec::new("A", "t").with_json_path("v")])
        .await
        .unwrap();
    wait_for("initial subscription", || broker.subscribed().contains("t")).await;
    assert_eq!(broker.connect_count(), 1);

    broker.drop_sessions();

    wait_for("reconnect", || broker.connect_count() >= 2).await;
    wait_for("subscription replay", || broker.subscribed().contains("t")).await;
    assert_eq!(
        broker.subscribe_log(),
        vec!["t".to_string(), "t".to_string()],
        "the topic must be re-subscribed exactly once after reconnect"
    );
}

#[tokio::test]
async fn test_series_history_survives_reconnect() {
    let broker = MockBroker::new();
    let client = client_with(&broker);

    let mut stream = client
        .query(vec![QuerySpec::new("A", "t").with_value_encoding(ValueEncoding::Text)])
        .await
        .unwrap();
    wait_for("initial subscription", || broker.subscribed().contains("t")).await;

    broker.publish("t", b"1.0");
    let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.points.len(), 1);

    broker.drop_sessions();
    wait_for("subscription replay", || broker.subscribed().contains("t")).await;

    broker.publish("t", b"2.0");
    let second = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        second.points.iter().map(|p| p.value).collect::<Vec<_>>(),
        vec![Some(1.0), Some(2.0)],
        "retained history must not be discarded by a transient drop"
    );
}

#[tokio::test]
async fn test_queries_started_before_first_successful_connect_stream_later() {
    let broker = MockBroker::new();
    broker.fail_next_connects(2);
    let client = client_with(&broker);

    let mut stream = client
        .query(vec![QuerySpec::new("A", "t").with_json_path("v")])
        .await
        .unwrap();

    wait_for("eventual subscription", || broker.subscribed().contains("t")).await;
    assert!(broker.connect_count() >= 3);

    broker.publish("t", br#"{"v":4}"#);
    let update = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.points[0].value, Some(4.0));
}

#[tokio::test]
async fn test_retry_exhaustion_is_surfaced_on_the_stream() {
    let broker = MockBroker::new();
    broker.fail_next_connects(usize::MAX);
    let client = PulseLinkClient::builder()
        .endpoint("ws://broker.test:9001/")
        .transport(broker.transport())
        .timeouts(PulseLinkTimeouts::fast())
        .connection_options(
            ConnectionOptions::new()
                .with_reconnect_delay_ms(10)
                .with_max_reconnect_delay_ms(20)
                .with_max_reconnect_attempts(Some(2)),
        )
        .build()
        .unwrap();

    let mut stream = client
        .query(vec![QuerySpec::new("A", "t").with_json_path("v")])
        .await
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("exhaustion must be reported before timeout")
        .expect("an update is expected");
    match update.status {
        StreamStatus::Error { message } => {
            assert!(message.contains("exhausted"), "message: {}", message)
        }
        other => panic!("expected error status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_tears_the_connection_down() {
    let broker = MockBroker::new();
    let client = client_with(&broker);

    let mut stream = client
        .query(vec![QuerySpec::new("A", "t").with_json_path("v")])
        .await
        .unwrap();
    wait_for("subscription", || broker.subscribed().contains("t")).await;

    client.disconnect().await;

    let end = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream must end after disconnect");
    assert!(end.is_none());
}
