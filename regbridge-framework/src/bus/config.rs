//! Message-bus connection settings.

use std::path::PathBuf;
use std::time::Duration;

use regbridge_common::DEFAULT_BASE_TOPIC;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BridgeError, Result};

/// Which bus to connect to, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    /// MQTT broker.
    Mqtt(MqttConfig),
    /// Zenoh network.
    Zenoh(ZenohBusConfig),
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig::Mqtt(MqttConfig::default())
    }
}

impl BusConfig {
    /// Prefix for every published topic.
    pub fn base_topic(&self) -> &str {
        match self {
            BusConfig::Mqtt(c) => &c.base_topic,
            BusConfig::Zenoh(c) => &c.base_topic,
        }
    }

    /// Interval of the connection health check.
    pub fn check_interval(&self) -> Duration {
        let secs = match self {
            BusConfig::Mqtt(c) => c.check_interval_secs,
            BusConfig::Zenoh(c) => c.check_interval_secs,
        };
        Duration::from_secs(secs)
    }

    /// How long to wait for the first connection at startup.
    pub fn connect_timeout(&self) -> Duration {
        match self {
            BusConfig::Mqtt(c) => Duration::from_secs(c.connect_timeout_secs),
            BusConfig::Zenoh(_) => Duration::ZERO,
        }
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.base_topic().trim_matches('/').is_empty() {
            return Err(BridgeError::validation("base_topic cannot be empty"));
        }
        if self.check_interval().is_zero() {
            return Err(BridgeError::validation(
                "check_interval_secs must be greater than 0",
            ));
        }

        match self {
            BusConfig::Mqtt(c) => c.validate(),
            BusConfig::Zenoh(c) => c.validate(),
        }
    }
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker URI, e.g. `mqtt://localhost:1883` or `mqtts://broker:8883`.
    #[serde(default = "default_server")]
    pub server: String,

    /// Prefix for every published topic.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,

    /// Username (used only together with `password`).
    #[serde(default)]
    pub user: Option<String>,

    /// Password (used only together with `user`).
    #[serde(default)]
    pub password: Option<String>,

    /// Client identifier (default: `regbridge-<pid>`).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Keepalive in seconds (default: 60).
    #[serde(default)]
    pub keepalive: Option<u64>,

    /// Path to the CA certificate (PEM). Required for `mqtts://`.
    #[serde(default)]
    pub ca: Option<PathBuf>,

    /// Path to the client private key (PEM).
    #[serde(default)]
    pub key: Option<PathBuf>,

    /// Path to the client certificate (PEM).
    #[serde(default)]
    pub cert: Option<PathBuf>,

    /// Verify the broker certificate (default: true).
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,

    /// Delay between reconnection attempts in milliseconds.
    #[serde(default = "default_reconnect_period_ms")]
    pub reconnect_period_ms: u64,

    /// Interval of the connection health check in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// How long to wait for the first connection at startup, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_server() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_base_topic() -> String {
    DEFAULT_BASE_TOPIC.to_string()
}

fn default_true() -> bool {
    true
}

fn default_reconnect_period_ms() -> u64 {
    1000
}

fn default_check_interval_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            base_topic: default_base_topic(),
            user: None,
            password: None,
            client_id: None,
            keepalive: None,
            ca: None,
            key: None,
            cert: None,
            reject_unauthorized: true,
            reconnect_period_ms: default_reconnect_period_ms(),
            check_interval_secs: default_check_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl MqttConfig {
    /// Parse the broker URI.
    pub fn server_address(&self) -> Result<ServerAddress> {
        ServerAddress::parse(&self.server)
    }

    /// Client identifier to present to the broker.
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("regbridge-{}", std::process::id()))
    }

    /// Keepalive interval.
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive.unwrap_or(60))
    }

    /// Delay between reconnection attempts.
    pub fn reconnect_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_period_ms)
    }

    fn validate(&self) -> Result<()> {
        let address = self.server_address()?;

        if address.tls && self.ca.is_none() {
            return Err(BridgeError::validation(format!(
                "'{}' uses TLS but no 'ca' certificate is configured",
                self.server
            )));
        }

        if self.key.is_some() != self.cert.is_some() {
            return Err(BridgeError::validation(
                "'key' and 'cert' must be configured together",
            ));
        }

        if self.keepalive == Some(0) {
            return Err(BridgeError::validation("keepalive must be greater than 0"));
        }

        Ok(())
    }
}

/// Broker address parsed from the `server` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl ServerAddress {
    /// Parse `mqtt://`, `tcp://`, `mqtts://`, `ssl://` or `tls://` URIs.
    pub fn parse(server: &str) -> Result<Self> {
        let url = Url::parse(server).map_err(|e| {
            BridgeError::validation(format!("invalid server URI '{}': {}", server, e))
        })?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" | "tls" => true,
            other => {
                return Err(BridgeError::validation(format!(
                    "unsupported server scheme '{}' (use mqtt:// or mqtts://)",
                    other
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BridgeError::validation(format!("server URI '{}' has no host", server)))?
            .to_string();

        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self { host, port, tls })
    }
}

/// Zenoh connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohBusConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,

    /// Prefix for every published key.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,

    /// Interval of the connection health check in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohBusConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
            base_topic: default_base_topic(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl ZenohBusConfig {
    fn validate(&self) -> Result<()> {
        match self.mode.as_str() {
            "client" | "peer" | "router" => Ok(()),
            other => Err(BridgeError::validation(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            ))),
        }
    }
}
