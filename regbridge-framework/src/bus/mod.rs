//! Message-bus abstraction.
//!
//! Bridges talk to the bus only through [`BusClient`]. Two adapters ship with
//! the framework: [`MqttBus`] (rumqttc) and [`ZenohBus`] (zenoh). Both report
//! their link through [`LinkState`], which the
//! [`ConnectionSupervisor`](crate::ConnectionSupervisor) observes.

mod config;
mod mqtt_bus;
mod zenoh_bus;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::Result;

pub use config::{BusConfig, MqttConfig, ServerAddress, ZenohBusConfig};
pub use mqtt_bus::MqttBus;
pub use zenoh_bus::ZenohBus;

/// Capacity of the channel carrying incoming bus messages.
pub const INCOMING_CAPACITY: usize = 64;

/// Reachability of the message bus as reported by the client.
///
/// Transitions are driven by the client's own reconnection logic:
/// `Disconnected -> Connecting -> Connected -> Reconnecting -> Connected | Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl LinkState {
    /// Whether messages can be handed to the bus right now.
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    /// Whether the client lost its link and is trying to get it back.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, LinkState::Reconnecting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn level(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// Options for a single publish.
///
/// The defaults are `{ qos: AtMostOnce, retain: false }`; callers override
/// individual fields with struct update syntax:
///
/// ```
/// use regbridge_framework::PublishOptions;
///
/// let options = PublishOptions { retain: true, ..Default::default() };
/// assert_eq!(options.qos.level(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl PublishOptions {
    /// Options for retained state messages.
    pub fn retained() -> Self {
        Self {
            retain: true,
            ..Default::default()
        }
    }
}

/// A message received from the bus on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Message published by the bus on the bridge's behalf if it drops off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Transport-agnostic message-bus client.
///
/// Implementations must be safe for concurrent `publish` calls from many
/// device pollers.
#[async_trait]
pub trait BusClient: Send + Sync + fmt::Debug {
    /// Current link state. Cheap, never blocks.
    fn link_state(&self) -> LinkState;

    /// Notified on every link transition, for clients that can drop and
    /// regain their link. Each (re)connection is reported as `Connected`.
    fn link_updates(&self) -> Option<watch::Receiver<LinkState>> {
        None
    }

    /// Hand a message to the bus. Resolves once the client accepted the send.
    async fn publish(&self, topic: &str, payload: Vec<u8>, options: PublishOptions) -> Result<()>;

    /// Subscribe to a topic; messages arrive on the channel returned by `connect`.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;
}

/// A connected client plus the stream of incoming messages.
pub struct BusConnection {
    pub client: Arc<dyn BusClient>,
    pub incoming: mpsc::Receiver<BusMessage>,
}

/// Open the bus described by `config`.
///
/// The link is established in the background; check
/// [`BusClient::link_state`] before relying on it.
pub async fn connect(config: &BusConfig, will: Option<LastWill>) -> Result<BusConnection> {
    match config {
        BusConfig::Mqtt(mqtt) => {
            let (client, incoming) = MqttBus::connect(mqtt, will)?;
            Ok(BusConnection {
                client: Arc::new(client),
                incoming,
            })
        }
        BusConfig::Zenoh(zenoh) => {
            let (client, incoming) = ZenohBus::connect(zenoh).await?;
            Ok(BusConnection {
                client: Arc::new(client),
                incoming,
            })
        }
    }
}
