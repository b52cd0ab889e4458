//! Modbus bridge for regbridge.
//!
//! Polls Modbus devices and publishes their readings to MQTT or Zenoh.

use std::sync::Arc;

use anyhow::{Context, Result};
use regbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
use regbridge_modbus::bridge::{Bridge, REQUEST_TOPIC, serve_commands};
use regbridge_modbus::config::ModbusBridgeConfig;
use tokio::sync::Mutex;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("modbus.json5");

    let config = ModbusBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let mut runner = BridgeRunner::new_with_args("modbus", config, Some(&args)).await?;
    info!("Loaded configuration from {:?}", args.config);

    let supervisor = runner.supervisor();
    let modbus = runner.config().modbus.clone();
    let mut bridge = Bridge::from_config(&modbus, supervisor.clone());

    for device in modbus.devices {
        let id = device.id.clone();
        match bridge.add_device(device).await {
            Ok(()) => info!(device = %id, "Device added"),
            Err(e) => error!(device = %id, error = %e, "Device not added"),
        }
    }

    let metadata = serde_json::json!({
        "devices": bridge.device_ids(),
        "poll_interval_ms": modbus.poll_interval_ms,
    });

    info!(
        "Modbus bridge running with {} device(s)",
        bridge.device_ids().len()
    );

    let bridge = Arc::new(Mutex::new(bridge));

    if let Some(messages) = runner.take_messages() {
        supervisor
            .subscribe(REQUEST_TOPIC)
            .await
            .context("Failed to subscribe to bridge commands")?;
        runner.spawn(serve_commands(bridge.clone(), supervisor.clone(), messages));
    }

    runner.on_shutdown(async move {
        bridge.lock().await.shutdown();
    });

    runner.run_with_metadata(Some(metadata)).await?;
    info!("Modbus bridge stopped");

    Ok(())
}
