//! regbridge Bridge Framework
//!
//! Common abstractions for building bridges that poll field devices and
//! publish their readings to a message bus.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`ConnectionSupervisor`] as the single, reachability-gated publish path
//! - [`BusClient`] with MQTT ([`MqttBus`]) and Zenoh ([`ZenohBus`]) adapters
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`StatusPublisher`] for `online` / `offline` bridge state
//!
//! # Example
//!
//! ```ignore
//! use regbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args)).await?;
//!
//!     // Spawn protocol-specific workers
//!     runner.spawn(my_worker(runner.supervisor()));
//!
//!     // Run until Ctrl+C
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
pub mod bus;
mod config;
mod error;
mod runner;
mod status;
mod supervisor;

pub use args::BridgeArgs;
pub use bus::{
    BusClient, BusConfig, BusConnection, BusMessage, LastWill, LinkState, MqttBus, MqttConfig,
    PublishOptions, QoS, ZenohBus, ZenohBusConfig,
};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use runner::BridgeRunner;
pub use status::{BridgeInfo, BridgeState, StatusPublisher};
pub use supervisor::{ConnectionState, ConnectionSupervisor, PublishOutcome};

// Re-export commonly used types from regbridge-common
pub use regbridge_common::{Document, LogFormat, LoggingConfig, TopicBuilder};
