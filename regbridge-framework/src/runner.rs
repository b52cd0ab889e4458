//! Bridge runner for lifecycle management.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use regbridge_common::init_tracing;

use crate::BridgeArgs;
use crate::bus::{self, BusClient, BusConnection, BusMessage, LinkState};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::status::{BridgeState, StatusPublisher};
use crate::supervisor::ConnectionSupervisor;

type ShutdownHook = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Bridge runner that manages the lifecycle of a field-device bridge.
///
/// Handles:
/// - Logging initialization
/// - Bus connection, with an `offline` last will on `<base>/bridge/state`
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C
/// - Bridge state publishing
///
/// # Example
///
/// ```ignore
/// use regbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args)).await?;
///
///     let supervisor = runner.supervisor();
///     runner.spawn(async move {
///         // Worker logic here
///     });
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Bus client shared with the supervisor.
    client: Arc<dyn BusClient>,
    /// Messages arriving on subscribed topics, until taken.
    incoming: Option<mpsc::Receiver<BusMessage>>,
    /// Gated publish path.
    supervisor: Arc<ConnectionSupervisor>,
    /// Bridge state publisher.
    status: StatusPublisher,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
    /// Run before tasks are aborted.
    shutdown_hooks: Vec<ShutdownHook>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner.
    pub async fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None).await
    }

    /// Create a new bridge runner with CLI args for log level override.
    ///
    /// This will:
    /// 1. Initialize logging based on config (with optional CLI override)
    /// 2. Open the bus connection
    /// 3. Wait up to the configured connect timeout for the link to come up
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();

        let log_config = config
            .logging()
            .with_level_override(args.and_then(|a| a.log_level.as_deref()));
        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(
            bridge = %name,
            version = env!("CARGO_PKG_VERSION"),
            base_topic = %config.base_topic(),
            "Starting bridge"
        );

        let state_topic = regbridge_common::TopicBuilder::new(config.base_topic()).bridge_state();
        let will = BridgeState::Offline.as_last_will(state_topic);
        let connection = bus::connect(config.bus(), Some(will)).await?;

        let runner = Self::with_connection(name, config, connection);
        runner.wait_for_link().await;
        Ok(runner)
    }

    /// Create a runner around an already opened bus connection.
    ///
    /// Does not initialize logging.
    pub fn with_connection(name: impl Into<String>, config: C, connection: BusConnection) -> Self {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();
        let supervisor = Arc::new(ConnectionSupervisor::new(
            Some(connection.client.clone()),
            config.base_topic(),
            config.bus().check_interval(),
        ));

        Self {
            status: StatusPublisher::new(&name, &version),
            name,
            version,
            config,
            client: connection.client,
            incoming: Some(connection.incoming),
            supervisor,
            tasks: Vec::new(),
            shutdown_hooks: Vec::new(),
        }
    }

    async fn wait_for_link(&self) {
        let timeout = self.config.bus().connect_timeout();
        if timeout.is_zero() || self.client.link_state().is_connected() {
            return;
        }

        let client = self.client.clone();
        let wait = async move {
            while !client.link_state().is_connected() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        if tokio::time::timeout(timeout, wait).await.is_err() {
            tracing::warn!(
                timeout = ?timeout,
                "Message bus not reachable yet, continuing; publishes are dropped until it is"
            );
        }
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a handle to the connection supervisor.
    pub fn supervisor(&self) -> Arc<ConnectionSupervisor> {
        self.supervisor.clone()
    }

    /// Take the receiver of messages on subscribed topics.
    ///
    /// Returns `None` after the first call.
    pub fn take_messages(&mut self) -> Option<mpsc::Receiver<BusMessage>> {
        self.incoming.take()
    }

    /// Spawn a worker task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Register a future to run on shutdown, before tasks are aborted.
    pub fn on_shutdown<F>(&mut self, hook: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown_hooks.push(Box::pin(hook));
    }

    /// Run the bridge until Ctrl+C is received.
    pub async fn run(self) -> Result<()> {
        self.run_with_metadata(None).await
    }

    /// Run the bridge until Ctrl+C, with custom info metadata.
    pub async fn run_with_metadata(self, metadata: Option<serde_json::Value>) -> Result<()> {
        let signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        };
        self.run_until(signal, metadata).await
    }

    /// Run the bridge until `signal` completes.
    ///
    /// This will:
    /// 1. Publish `online` state and info, again after every reconnection
    /// 2. Wait for the signal
    /// 3. Run shutdown hooks, then abort all spawned tasks
    /// 4. Publish `offline` state and info
    /// 5. Disconnect from the bus
    pub async fn run_until<S>(self, signal: S, metadata: Option<serde_json::Value>) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let mut updates = self.client.link_updates();
        if let Some(updates) = updates.as_mut() {
            updates.borrow_and_update();
        }

        if let Err(e) = self
            .status
            .publish_online(&self.supervisor, metadata.clone())
            .await
        {
            tracing::warn!(error = %e, "Failed to publish online state");
        }

        // A reconnect may follow a last will; restore the retained state.
        let announcer = updates.map(|updates| {
            tokio::spawn(announce_online(
                updates,
                self.status.clone(),
                self.supervisor.clone(),
                metadata,
            ))
        });

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        signal.await;

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        for hook in self.shutdown_hooks {
            hook.await;
        }

        if let Some(announcer) = &announcer {
            announcer.abort();
        }
        for task in &self.tasks {
            task.abort();
        }

        // Wait briefly for tasks to clean up
        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Err(e) = self.status.publish_offline(&self.supervisor).await {
            tracing::warn!(error = %e, "Failed to publish offline state");
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(error = %e, "Error disconnecting from message bus");
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}

async fn announce_online(
    mut updates: watch::Receiver<LinkState>,
    status: StatusPublisher,
    supervisor: Arc<ConnectionSupervisor>,
    metadata: Option<serde_json::Value>,
) {
    while updates.changed().await.is_ok() {
        if !updates.borrow_and_update().is_connected() {
            continue;
        }

        tracing::info!("Message bus reconnected, announcing online state");
        if let Err(e) = status.publish_online(&supervisor, metadata.clone()).await {
            tracing::warn!(error = %e, "Failed to publish online state");
        }
    }
}
