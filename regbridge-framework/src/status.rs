//! Bridge state and info reporting.
//!
//! `<base>/bridge/state` carries a retained `online` / `offline` string; the
//! MQTT last will publishes `offline` there if the bridge drops off.
//! `<base>/bridge/info` carries a JSON [`BridgeInfo`] document.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::bus::{LastWill, PublishOptions};
use crate::supervisor::{ConnectionSupervisor, PublishOutcome};

/// Bridge availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Online,
    Offline,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Online => "online",
            BridgeState::Offline => "offline",
        }
    }

    /// Last will announcing this state on `state_topic`.
    pub fn as_last_will(&self, state_topic: impl Into<String>) -> LastWill {
        LastWill {
            topic: state_topic.into(),
            payload: self.as_str().as_bytes().to_vec(),
            retain: true,
        }
    }
}

/// Bridge information document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeInfo {
    /// Bridge name (e.g., "modbus").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current state.
    pub state: BridgeState,
    /// Milliseconds since the Unix epoch when this document was built.
    pub timestamp: i64,
    /// Additional metadata (protocol-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeInfo {
    /// Create info for a bridge in the given state.
    pub fn new(bridge: impl Into<String>, version: impl Into<String>, state: BridgeState) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            state,
            timestamp: chrono::Utc::now().timestamp_millis(),
            metadata: serde_json::json!({}),
        }
    }

    /// Add metadata to the info.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Helper to publish bridge state on startup and shutdown.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    bridge_name: String,
    version: String,
}

impl StatusPublisher {
    /// Create a new status publisher.
    pub fn new(bridge_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    /// Publish `online` and the info document with optional metadata.
    pub async fn publish_online(
        &self,
        supervisor: &ConnectionSupervisor,
        metadata: Option<serde_json::Value>,
    ) -> Result<PublishOutcome> {
        let mut info = BridgeInfo::new(&self.bridge_name, &self.version, BridgeState::Online);
        if let Some(meta) = metadata {
            info = info.with_metadata(meta);
        }
        self.publish(supervisor, info).await
    }

    /// Publish `offline` and the info document.
    pub async fn publish_offline(&self, supervisor: &ConnectionSupervisor) -> Result<PublishOutcome> {
        let info = BridgeInfo::new(&self.bridge_name, &self.version, BridgeState::Offline);
        self.publish(supervisor, info).await
    }

    async fn publish(
        &self,
        supervisor: &ConnectionSupervisor,
        info: BridgeInfo,
    ) -> Result<PublishOutcome> {
        let topics = supervisor.topics();
        let payload = serde_json::to_vec(&info)?;

        supervisor
            .publish_to(&topics.bridge_info(), payload, PublishOptions::retained())
            .await?;
        supervisor
            .publish_to(
                &topics.bridge_state(),
                info.state.as_str(),
                PublishOptions::retained(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings() {
        assert_eq!(BridgeState::Online.as_str(), "online");
        assert_eq!(BridgeState::Offline.as_str(), "offline");
    }

    #[test]
    fn test_last_will() {
        let will = BridgeState::Offline.as_last_will("m2m/bridge/state");
        assert_eq!(will.topic, "m2m/bridge/state");
        assert_eq!(will.payload, b"offline".to_vec());
        assert!(will.retain);
    }

    #[test]
    fn test_info_with_metadata() {
        let info = BridgeInfo::new("modbus", "0.2.0", BridgeState::Online).with_metadata(
            serde_json::json!({
                "devices": ["meter01", "meter02"],
                "poll_interval_ms": 10000
            }),
        );

        assert_eq!(info.metadata["devices"][0], "meter01");
        assert_eq!(info.metadata["poll_interval_ms"], 10000);
    }

    #[test]
    fn test_info_serialization() {
        let info = BridgeInfo::new("test", "1.0.0", BridgeState::Online)
            .with_metadata(serde_json::json!({ "count": 5 }));

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"bridge\":\"test\""));
        assert!(json.contains("\"state\":\"online\""));
        assert!(json.contains("\"count\":5"));
    }
}
