//! MQTT adapter built on rumqttc.
//!
//! rumqttc only makes progress while its event loop is polled, so the adapter
//! owns a background task that drives it, translates connection events into
//! [`LinkState`] transitions and forwards incoming publishes. Reconnection is
//! entirely rumqttc's: after an error the next poll reconnects.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, TlsConfiguration, Transport,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BusClient, BusMessage, INCOMING_CAPACITY, LastWill, LinkState, MqttConfig, PublishOptions, QoS};
use crate::error::{BridgeError, Result};

/// Capacity of rumqttc's request channel.
const REQUEST_CAPACITY: usize = 64;

/// MQTT client with a background event loop.
#[derive(Debug)]
pub struct MqttBus {
    client: AsyncClient,
    state: watch::Receiver<LinkState>,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    closing: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MqttBus {
    /// Build the client and start its event loop.
    ///
    /// Returns immediately; the link state starts at `Connecting`.
    pub fn connect(
        config: &MqttConfig,
        will: Option<LastWill>,
    ) -> Result<(Self, mpsc::Receiver<BusMessage>)> {
        let options = build_options(config, will)?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CAPACITY);
        let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));
        let closing = Arc::new(AtomicBool::new(false));

        info!(server = %config.server, "Connecting to MQTT server");

        let task = tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            state_tx,
            subscriptions.clone(),
            closing.clone(),
            incoming_tx,
            config.reconnect_period(),
        ));

        Ok((
            Self {
                client,
                state: state_rx,
                subscriptions,
                closing,
                task,
            },
            incoming_rx,
        ))
    }
}

#[async_trait]
impl BusClient for MqttBus {
    fn link_state(&self) -> LinkState {
        *self.state.borrow()
    }

    fn link_updates(&self) -> Option<watch::Receiver<LinkState>> {
        Some(self.state.clone())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, options: PublishOptions) -> Result<()> {
        self.client
            .publish(topic, options.qos.into(), options.retain, payload)
            .await
            .map_err(|e| BridgeError::publish(topic, e))
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let newly_added = self.subscriptions.lock().await.insert(topic.to_string());

        // Subscriptions are (re)sent on every ConnAck; only send now if the
        // link is already up.
        if newly_added && self.link_state().is_connected() {
            self.client
                .subscribe(topic, QoS::AtMostOnce.into())
                .await
                .map_err(|e| BridgeError::Subscribe {
                    topic: topic.to_string(),
                    message: e.to_string(),
                })?;
        }

        debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        info!("Disconnecting from MQTT server");

        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "Event loop already stopped");
        }

        let mut state = self.state.clone();
        let _ = tokio::time::timeout(
            Duration::from_secs(1),
            state.wait_for(|s| *s == LinkState::Disconnected),
        )
        .await;

        self.task.abort();
        Ok(())
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn build_options(config: &MqttConfig, will: Option<LastWill>) -> Result<MqttOptions> {
    let address = config.server_address()?;
    let client_id = config.client_id();

    let mut options = MqttOptions::new(&client_id, &address.host, address.port);
    options.set_keep_alive(config.keepalive());
    debug!(client_id = %client_id, keepalive = ?config.keepalive(), "MQTT client options");

    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        options.set_credentials(user, password);
    }

    if let Some(will) = will {
        options.set_last_will(rumqttc::LastWill::new(
            will.topic,
            will.payload,
            rumqttc::QoS::AtMostOnce,
            will.retain,
        ));
    }

    if address.tls {
        let ca_path = config
            .ca
            .as_deref()
            .ok_or_else(|| BridgeError::config("TLS server requires a 'ca' certificate"))?;
        debug!(ca = %ca_path.display(), "MQTT SSL/TLS: CA certificate");
        let ca = read_pem(ca_path)?;

        let client_auth = match (&config.cert, &config.key) {
            (Some(cert), Some(key)) => {
                debug!(cert = %cert.display(), key = %key.display(), "MQTT SSL/TLS: client certificate");
                Some((read_pem(cert)?, read_pem(key)?))
            }
            _ => None,
        };

        if !config.reject_unauthorized {
            warn!("reject_unauthorized=false is not supported; the broker certificate is still verified");
        }

        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        }));
    }

    Ok(options)
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        BridgeError::config(format!("Failed to read '{}': {}", path.display(), e))
    })
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    state: watch::Sender<LinkState>,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    closing: Arc<AtomicBool>,
    incoming: mpsc::Sender<BusMessage>,
    reconnect_period: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "Connected to MQTT server");
                state.send_replace(LinkState::Connected);

                for topic in subscriptions.lock().await.iter() {
                    if let Err(e) = client.try_subscribe(topic, QoS::AtMostOnce.into()) {
                        warn!(topic = %topic, error = %e, "Failed to resubscribe");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BusMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if let Err(e) = incoming.try_send(message) {
                    warn!(topic = %publish.topic, error = %e, "Dropping incoming message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                state.send_replace(LinkState::Disconnected);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if closing.load(Ordering::Acquire) {
                    state.send_replace(LinkState::Disconnected);
                    break;
                }

                let previous = state.send_replace(LinkState::Reconnecting);
                if previous == LinkState::Connected {
                    error!(error = %e, "Lost connection to MQTT server");
                } else {
                    debug!(error = %e, "MQTT connection attempt failed");
                }
                tokio::time::sleep(reconnect_period).await;
            }
        }
    }

    debug!("MQTT event loop stopped");
}
