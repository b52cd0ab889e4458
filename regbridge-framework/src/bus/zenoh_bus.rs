//! Zenoh adapter.
//!
//! Zenoh manages peer links and reconnection internally and has no notion of
//! a reconnecting client, so the link is `Connected` from the moment the
//! session opens until [`BusClient::disconnect`] closes it. Zenoh has no
//! retained messages; the `retain` option is ignored.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::pubsub::Subscriber;
use zenoh::qos::CongestionControl;

use super::{BusClient, BusMessage, INCOMING_CAPACITY, LinkState, PublishOptions, QoS, ZenohBusConfig};
use crate::error::{BridgeError, Result};

/// Zenoh session exposed as a [`BusClient`].
pub struct ZenohBus {
    session: Session,
    closed: AtomicBool,
    subscribers: Mutex<Vec<Subscriber<()>>>,
    incoming: mpsc::Sender<BusMessage>,
}

impl std::fmt::Debug for ZenohBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenohBus")
            .field("zid", &self.session.zid().to_string())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ZenohBus {
    /// Open a Zenoh session using the provided configuration.
    pub async fn connect(config: &ZenohBusConfig) -> Result<(Self, mpsc::Receiver<BusMessage>)> {
        let session = open_session(config).await?;
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CAPACITY);

        Ok((
            Self {
                session,
                closed: AtomicBool::new(false),
                subscribers: Mutex::new(Vec::new()),
                incoming: incoming_tx,
            },
            incoming_rx,
        ))
    }
}

#[async_trait]
impl BusClient for ZenohBus {
    fn link_state(&self) -> LinkState {
        if self.closed.load(Ordering::Acquire) {
            LinkState::Disconnected
        } else {
            LinkState::Connected
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, options: PublishOptions) -> Result<()> {
        let congestion = match options.qos {
            QoS::AtMostOnce => CongestionControl::Drop,
            QoS::AtLeastOnce | QoS::ExactlyOnce => CongestionControl::Block,
        };

        self.session
            .put(topic, payload)
            .congestion_control(congestion)
            .await
            .map_err(|e| BridgeError::publish(topic, e))
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let tx = self.incoming.clone();
        let subscriber = self
            .session
            .declare_subscriber(topic)
            .callback(move |sample| {
                let message = BusMessage {
                    topic: sample.key_expr().to_string(),
                    payload: sample.payload().to_bytes().to_vec(),
                };
                if let Err(e) = tx.try_send(message) {
                    warn!(error = %e, "Dropping incoming sample");
                }
            })
            .await
            .map_err(|e| BridgeError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        self.subscribers.lock().await.push(subscriber);
        debug!(key = %topic, "Subscribed");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.subscribers.lock().await.clear();
        self.session
            .close()
            .await
            .map_err(|e| BridgeError::Bus(format!("Failed to close Zenoh session: {}", e)))?;
        info!("Zenoh session closed");
        Ok(())
    }
}

async fn open_session(config: &ZenohBusConfig) -> Result<Session> {
    let mut zenoh_config = zenoh::Config::default();

    // Set mode
    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(BridgeError::config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| BridgeError::config(format!("Failed to set mode: {}", e)))?;

    // Set connect endpoints
    if !config.connect.is_empty() {
        let endpoints_json = serde_json::to_string(&config.connect)?;
        zenoh_config
            .insert_json5("connect/endpoints", &endpoints_json)
            .map_err(|e| BridgeError::config(format!("Failed to set connect endpoints: {}", e)))?;
    }

    // Set listen endpoints
    if !config.listen.is_empty() {
        let endpoints_json = serde_json::to_string(&config.listen)?;
        zenoh_config
            .insert_json5("listen/endpoints", &endpoints_json)
            .map_err(|e| BridgeError::config(format!("Failed to set listen endpoints: {}", e)))?;
    }

    info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config)
        .await
        .map_err(|e| BridgeError::BusConnection(e.to_string()))?;

    info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}
