//! End-to-end tests of the Zenoh bus adapter and the supervisor.
//!
//! Note: Zenoh requires multi-thread tokio runtime.
//! Each test uses a unique base topic to avoid interference.

use std::time::Duration;

use regbridge_framework::{
    BusClient, BusConfig, ConnectionSupervisor, LinkState, PublishOptions, PublishOutcome,
    ZenohBusConfig, bus,
};

fn unique_base() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{}", nanos)
}

fn zenoh_config(base: &str) -> BusConfig {
    BusConfig::Zenoh(ZenohBusConfig {
        base_topic: base.to_string(),
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_device_document_round_trip() {
    let base = unique_base();
    let config = zenoh_config(&base);

    let mut connection = bus::connect(&config, None).await.expect("Failed to connect");
    assert_eq!(connection.client.link_state(), LinkState::Connected);

    connection
        .client
        .subscribe(&format!("{}/**", base))
        .await
        .expect("Failed to subscribe");

    // Give subscriber time to set up
    tokio::time::sleep(Duration::from_millis(100)).await;

    let supervisor = ConnectionSupervisor::new(
        Some(connection.client.clone()),
        &base,
        config.check_interval(),
    );
    let outcome = supervisor
        .publish("meter01", r#"{"temp":23.5}"#, PublishOptions::default())
        .await
        .expect("Failed to publish");
    assert_eq!(outcome, PublishOutcome::Sent);

    let message = tokio::time::timeout(Duration::from_secs(5), connection.incoming.recv())
        .await
        .expect("Timeout waiting for message")
        .expect("Channel closed");

    assert_eq!(message.topic, format!("{}/meter01", base));
    let value: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(value, serde_json::json!({ "temp": 23.5 }));

    connection
        .client
        .disconnect()
        .await
        .expect("Failed to close session");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_dropped_after_disconnect() {
    let base = unique_base();
    let config = zenoh_config(&base);

    let connection = bus::connect(&config, None).await.expect("Failed to connect");
    let supervisor = ConnectionSupervisor::new(
        Some(connection.client.clone()),
        &base,
        config.check_interval(),
    );

    connection.client.disconnect().await.unwrap();
    assert_eq!(connection.client.link_state(), LinkState::Disconnected);

    let outcome = supervisor
        .publish("meter01", "{}", PublishOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, PublishOutcome::Dropped);
}
