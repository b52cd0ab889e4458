//! Integration tests for regbridge-common library.

use regbridge_common::{Document, TopicBuilder, parse_config, validate_segment};
use serde::Deserialize;
use serde_json::json;

#[test]
fn test_document_published_under_device_topic() {
    let topics = TopicBuilder::new("modbus2mqtt");
    let device_id = "sdm120-kitchen";
    validate_segment(device_id).expect("device id should be a valid topic level");

    let mut doc = Document::new();
    doc.set("voltage", json!(231.4)).unwrap();
    doc.set("power.active", json!(120.0)).unwrap();
    doc.set("power.reactive", json!(-3.5)).unwrap();

    assert_eq!(topics.build(device_id), "modbus2mqtt/sdm120-kitchen");

    let payload = doc.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(
        parsed,
        json!({
            "voltage": 231.4,
            "power": { "active": 120.0, "reactive": -3.5 }
        })
    );
}

#[test]
fn test_empty_document_serializes_to_empty_object() {
    let doc = Document::new();
    assert_eq!(doc.to_json().unwrap(), "{}");
}

#[test]
fn test_request_topic_round_trip() {
    let topics = TopicBuilder::new("site/a");
    let request = topics.bridge_request();

    assert_eq!(request, "site/a/bridge/request");
    assert_eq!(topics.strip_base(&request), Some("bridge/request"));
}

#[derive(Debug, Deserialize)]
struct Sample {
    base_topic: String,
    #[serde(default)]
    logging: regbridge_common::LoggingConfig,
}

#[test]
fn test_parse_json5_with_comments() {
    let config: Sample = parse_config(
        r#"{
            // trailing commas and comments are accepted
            base_topic: "m2m",
            logging: { level: "trace", },
        }"#,
    )
    .unwrap();

    assert_eq!(config.base_topic, "m2m");
    assert_eq!(config.logging.level, "trace");
}
