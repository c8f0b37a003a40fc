//! Monitor integration tests.
//!
//! Tests the monitor end to end:
//! - Activity accumulated from a WebSocket feed, duplicates dropped
//! - REST fallback once the stream endpoint is exhausted

mod integration;
use integration::common::mock_rest::MockRestServer;
use integration::common::mock_ws::MockWsServer;

use pulse_monitor::{Monitor, MonitorConfig};
use pulse_stream::{ConnectionStatus, StreamConfig};
use serde_json::json;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

fn stream_config() -> StreamConfig {
    StreamConfig {
        reconnect_interval_ms: 50,
        max_reconnect_delay_ms: 200,
        max_reconnect_attempts: 2,
        fallback_interval_ms: 100,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_monitor_accumulates_activity_from_websocket() {
    let server = MockWsServer::start(vec![
        json!([{ "id": "evt-2", "kind": "deploy" }, { "id": "evt-1", "kind": "build" }]).to_string(),
        json!({ "id": "evt-2", "kind": "deploy" }).to_string(),
        json!({ "id": "evt-3", "kind": "alert" }).to_string(),
    ])
    .await;

    let config = MonitorConfig {
        identity_field: Some("id".to_string()),
        stream: stream_config(),
        report_interval_ms: 50,
        ..MonitorConfig::for_endpoint(server.url("/ws/activity"))
    };
    let monitor = Monitor::new(config).unwrap();
    let mut rx = monitor.stream().subscribe();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(monitor.run(async {
        let _ = stop_rx.await;
    }));

    timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().seq < 3 {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("updates not received in time");

    // Let the run loop drain the broadcast channel.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = stop_tx.send(());
    let summary = run.await.unwrap().unwrap();

    assert_eq!(summary.final_status, ConnectionStatus::Connected);
    assert_eq!(summary.stats.transport_updates, 3);
    assert_eq!(summary.feed_len, 3);
    assert_eq!(summary.latest.unwrap()["id"], "evt-3");
    assert_eq!(server.connection_count().await, 1);

    let metrics = pulse_telemetry::Metrics::gather_text().unwrap();
    assert!(metrics.contains("pulse_updates_total"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_monitor_falls_back_to_rest() {
    let rest = MockRestServer::start(json!({ "id": "snap-1", "cpu": 0.42 })).await;

    // Nothing listens on the stream endpoint.
    let config = MonitorConfig {
        fallback_url: Some(rest.url()),
        stream: stream_config(),
        ..MonitorConfig::for_endpoint("ws://127.0.0.1:1/ws/telemetry")
    };
    let monitor = Monitor::new(config).unwrap();
    let mut rx = monitor.stream().subscribe();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(monitor.run(async {
        let _ = stop_rx.await;
    }));

    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.status == ConnectionStatus::Polling && snapshot.data.is_some() {
                    break;
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("fallback data not received in time");

    let _ = stop_tx.send(());
    let summary = run.await.unwrap().unwrap();

    assert_eq!(summary.final_status, ConnectionStatus::Polling);
    assert!(summary.stats.fallback_updates >= 1);
    assert_eq!(summary.latest.unwrap()["id"], "snap-1");
    assert!(rest.hits() >= 1);
}
