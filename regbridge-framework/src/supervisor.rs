//! Connection supervision and gated publishing.
//!
//! The [`ConnectionSupervisor`] is the single publish path to the bus. It
//! never queues: while the bus client is absent or its link is not up, a
//! publish is logged and dropped. A monitor task samples the client's link
//! state every check interval, keeps the [`ConnectionState`] snapshot and
//! keeps logging an error while the link is reconnecting.

use std::sync::Arc;
use std::time::Duration;

use regbridge_common::TopicBuilder;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::bus::{BusClient, LinkState, PublishOptions};
use crate::error::Result;

/// Snapshot of bus reachability, written only by the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// The link was up at the last check.
    pub reachable: bool,
    /// The client was reconnecting at the last check.
    pub reconnecting: bool,
}

impl ConnectionState {
    fn from_link(link: Option<LinkState>) -> Self {
        Self {
            reachable: link.is_some_and(|l| l.is_connected()),
            reconnecting: link.is_some_and(|l| l.is_reconnecting()),
        }
    }
}

/// What happened to a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The bus client accepted the message.
    Sent,
    /// The bus was unreachable; the message was discarded.
    Dropped,
}

/// Tracks bus reachability and gates outbound publishes.
pub struct ConnectionSupervisor {
    client: Option<Arc<dyn BusClient>>,
    topics: TopicBuilder,
    state: watch::Receiver<ConnectionState>,
    monitor: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("base_topic", &self.topics.base())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConnectionSupervisor {
    /// Create a supervisor and start its monitor task.
    ///
    /// Must be called from within a tokio runtime when `client` is present.
    pub fn new(
        client: Option<Arc<dyn BusClient>>,
        base_topic: impl Into<String>,
        check_interval: Duration,
    ) -> Self {
        let initial = ConnectionState::from_link(client.as_ref().map(|c| c.link_state()));
        let (state_tx, state_rx) = watch::channel(initial);

        let monitor = client
            .clone()
            .map(|client| tokio::spawn(monitor(client, state_tx, check_interval)));

        Self {
            client,
            topics: TopicBuilder::new(base_topic),
            state: state_rx,
            monitor,
        }
    }

    /// The topic builder for this bridge's base topic.
    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    /// Snapshot taken at the last check.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the bus was reachable at the last check.
    pub fn is_reachable(&self) -> bool {
        self.state().reachable
    }

    /// Live link state of the client, `None` if there is no client.
    pub fn link_state(&self) -> Option<LinkState> {
        self.client.as_ref().map(|c| c.link_state())
    }

    /// Subscribe to messages on `<base>/<topic>`.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        let full = self.topics.build(topic);
        match &self.client {
            Some(client) => client.subscribe(&full).await,
            None => {
                error!(topic = %full, "No message bus client, cannot subscribe");
                Ok(())
            }
        }
    }

    /// Publish `payload` at `<base>/<topic>`.
    ///
    /// Drops the message (returning [`PublishOutcome::Dropped`]) when the
    /// client is absent or not connected. Otherwise resolves once the client
    /// has accepted the send.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        options: PublishOptions,
    ) -> Result<PublishOutcome> {
        let full = self.topics.build(topic);
        self.publish_to(&full, payload, options).await
    }

    /// Publish at a full topic, bypassing the base topic.
    pub async fn publish_to(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        options: PublishOptions,
    ) -> Result<PublishOutcome> {
        let payload = payload.into();

        let client = match &self.client {
            Some(client) if client.link_state().is_connected() => client,
            _ => {
                error!("Not connected to message bus!");
                error!(
                    topic = %topic,
                    payload = %String::from_utf8_lossy(&payload),
                    "Cannot send message"
                );
                return Ok(PublishOutcome::Dropped);
            }
        };

        debug!(
            topic = %topic,
            payload = %String::from_utf8_lossy(&payload),
            qos = options.qos.level(),
            retain = options.retain,
            "Publish"
        );

        client.publish(topic, payload, options).await?;
        Ok(PublishOutcome::Sent)
    }

    /// Stop the monitor task.
    pub fn shutdown(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn monitor(
    client: Arc<dyn BusClient>,
    state: watch::Sender<ConnectionState>,
    check_interval: Duration,
) {
    let mut ticker = tokio::time::interval(check_interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let link = client.link_state();
        let snapshot = ConnectionState::from_link(Some(link));
        state.send_replace(snapshot);

        if link.is_reconnecting() {
            error!("Not connected to message bus!");
        } else {
            trace!(link = %link, "Message bus link checked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::QoS;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FakeBus {
        link: Mutex<LinkState>,
        sent: Mutex<Vec<(String, Vec<u8>, PublishOptions)>>,
    }

    impl FakeBus {
        fn new(link: LinkState) -> Arc<Self> {
            Arc::new(Self {
                link: Mutex::new(link),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn set_link(&self, link: LinkState) {
            *self.link.lock().unwrap() = link;
        }

        fn sent(&self) -> Vec<(String, Vec<u8>, PublishOptions)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BusClient for FakeBus {
        fn link_state(&self) -> LinkState {
            *self.link.lock().unwrap()
        }

        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            options: PublishOptions,
        ) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), payload, options));
            Ok(())
        }

        async fn subscribe(&self, _topic: &str) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.set_link(LinkState::Disconnected);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_prefixes_base_topic_and_defaults() {
        let bus = FakeBus::new(LinkState::Connected);
        let supervisor =
            ConnectionSupervisor::new(Some(bus.clone()), "modbus2mqtt", Duration::from_secs(10));

        let outcome = supervisor
            .publish("meter01", r#"{"temp":23.5}"#, PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Sent);
        let sent = bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "modbus2mqtt/meter01");
        assert_eq!(sent[0].1, br#"{"temp":23.5}"#.to_vec());
        assert_eq!(sent[0].2.qos, QoS::AtMostOnce);
        assert!(!sent[0].2.retain);
    }

    #[tokio::test]
    async fn test_caller_options_override_defaults() {
        let bus = FakeBus::new(LinkState::Connected);
        let supervisor = ConnectionSupervisor::new(Some(bus.clone()), "b", Duration::from_secs(10));

        supervisor
            .publish("bridge/state", "online", PublishOptions::retained())
            .await
            .unwrap();

        let sent = bus.sent();
        assert!(sent[0].2.retain);
        assert_eq!(sent[0].2.qos, QoS::AtMostOnce);
    }

    #[tokio::test]
    async fn test_publish_dropped_while_reconnecting() {
        let bus = FakeBus::new(LinkState::Reconnecting);
        let supervisor = ConnectionSupervisor::new(Some(bus.clone()), "b", Duration::from_secs(10));

        let outcome = supervisor
            .publish("meter01", "{}", PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Dropped);
        assert!(bus.sent().is_empty());
    }

    #[tokio::test]
    async fn test_publish_dropped_without_client() {
        let supervisor = ConnectionSupervisor::new(None, "b", Duration::from_secs(10));

        let outcome = supervisor
            .publish("meter01", "{}", PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Dropped);
        assert!(!supervisor.is_reachable());
        assert_eq!(supervisor.link_state(), None);
    }

    #[tokio::test]
    async fn test_publish_follows_live_link() {
        let bus = FakeBus::new(LinkState::Connected);
        let supervisor = ConnectionSupervisor::new(Some(bus.clone()), "b", Duration::from_secs(10));

        bus.set_link(LinkState::Reconnecting);
        let dropped = supervisor
            .publish("d", "1", PublishOptions::default())
            .await
            .unwrap();
        bus.set_link(LinkState::Connected);
        let sent = supervisor
            .publish("d", "2", PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(dropped, PublishOutcome::Dropped);
        assert_eq!(sent, PublishOutcome::Sent);
        assert_eq!(bus.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_to_full_topic() {
        let bus = FakeBus::new(LinkState::Connected);
        let supervisor = ConnectionSupervisor::new(Some(bus.clone()), "b", Duration::from_secs(10));

        tokio_test::assert_ok!(
            supervisor
                .publish_to("other/topic", "x", PublishOptions::default())
                .await
        );

        assert_eq!(bus.sent()[0].0, "other/topic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_snapshot_updated_by_monitor() {
        let bus = FakeBus::new(LinkState::Connecting);
        let supervisor = ConnectionSupervisor::new(Some(bus.clone()), "b", Duration::from_secs(10));
        assert_eq!(
            supervisor.state(),
            ConnectionState {
                reachable: false,
                reconnecting: false
            }
        );

        bus.set_link(LinkState::Connected);
        // The snapshot only changes on the monitor's tick.
        assert!(!supervisor.is_reachable());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(supervisor.is_reachable());

        bus.set_link(LinkState::Reconnecting);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            supervisor.state(),
            ConnectionState {
                reachable: false,
                reconnecting: true
            }
        );
    }
}
