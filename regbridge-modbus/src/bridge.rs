//! The set of polled devices and the command channel that changes it.

use std::collections::BTreeMap;
use std::sync::Arc;

use regbridge_framework::{BusMessage, ConnectionSupervisor, PublishOptions};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::commands::{BridgeCommand, CommandResponse, DeviceSummary};
use crate::config::{DeviceConfig, ModbusConfig};
use crate::device::Device;
use crate::error::ModbusError;
use crate::poller::{DevicePoller, PollSettings};
use crate::registry::{DescriptorRegistry, StaticRegistry};
use crate::transport::SessionPool;

/// Topic suffix commands are received on.
pub const REQUEST_TOPIC: &str = "bridge/request";

/// Owns one [`DevicePoller`] per device.
#[derive(Debug)]
pub struct Bridge {
    registry: Arc<dyn DescriptorRegistry>,
    supervisor: Arc<ConnectionSupervisor>,
    sessions: SessionPool,
    settings: PollSettings,
    pollers: BTreeMap<String, DevicePoller>,
}

impl Bridge {
    pub fn new(
        registry: Arc<dyn DescriptorRegistry>,
        supervisor: Arc<ConnectionSupervisor>,
        sessions: SessionPool,
        settings: PollSettings,
    ) -> Self {
        Self {
            registry,
            supervisor,
            sessions,
            settings,
            pollers: BTreeMap::new(),
        }
    }

    /// Bridge using the configured models and Modbus sessions.
    ///
    /// No devices are added yet.
    pub fn from_config(config: &ModbusConfig, supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self::new(
            Arc::new(StaticRegistry::from(&config.models)),
            supervisor,
            SessionPool::modbus(config.connect_timeout()),
            PollSettings {
                interval: config.poll_interval(),
                read_timeout: config.read_timeout(),
            },
        )
    }

    /// Resolve the device's model and start polling it.
    pub async fn add_device(&mut self, config: DeviceConfig) -> Result<(), ModbusError> {
        config.validate()?;
        if self.pollers.contains_key(&config.id) {
            return Err(ModbusError::DuplicateDevice(config.id));
        }

        let device = Device::new(config, self.registry.as_ref())?;

        self.sessions.prune().await;
        let session = self.sessions.session(&device.connection).await;

        let id = device.id.clone();
        let mut poller = DevicePoller::new(device, session, self.supervisor.clone(), self.settings);
        poller.start();
        self.pollers.insert(id, poller);
        Ok(())
    }

    /// Stop polling a device.
    ///
    /// Its loop may finish one more cycle after this returns.
    pub fn remove_device(&mut self, id: &str) -> Result<(), ModbusError> {
        let poller = self
            .pollers
            .remove(id)
            .ok_or_else(|| ModbusError::UnknownDevice(id.to_string()))?;
        poller.remove();
        Ok(())
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.pollers.keys().cloned().collect()
    }

    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.pollers
            .values()
            .map(|poller| {
                let device = poller.device();
                DeviceSummary {
                    id: device.id.clone(),
                    model: device.model.clone(),
                    unit_id: device.unit_id,
                    connection: device.connection.session_key(),
                }
            })
            .collect()
    }

    pub async fn handle_command(&mut self, command: BridgeCommand) -> CommandResponse {
        let result = match &command {
            BridgeCommand::AddDevice { device } => self.add_device(device.clone()).await,
            BridgeCommand::RemoveDevice { id } => self.remove_device(id),
            BridgeCommand::ListDevices => {
                return CommandResponse::ok(&command).with_devices(self.devices());
            }
        };

        match result {
            Ok(()) => {
                info!(command = command.name(), "Command applied");
                CommandResponse::ok(&command)
            }
            Err(e) => {
                warn!(command = command.name(), error = %e, "Command failed");
                CommandResponse::error(Some(&command), e)
            }
        }
    }

    /// Abort every poller.
    pub fn shutdown(&mut self) {
        for (_, mut poller) in std::mem::take(&mut self.pollers) {
            poller.abort();
        }
    }
}

/// Apply commands arriving on `<base>/bridge/request` until `messages` closes.
pub async fn serve_commands(
    bridge: Arc<Mutex<Bridge>>,
    supervisor: Arc<ConnectionSupervisor>,
    mut messages: mpsc::Receiver<BusMessage>,
) {
    let request_topic = supervisor.topics().bridge_request();
    let response_topic = supervisor.topics().bridge_response();

    while let Some(message) = messages.recv().await {
        if message.topic != request_topic {
            debug!(topic = %message.topic, "Ignoring message");
            continue;
        }

        let response = match serde_json::from_slice::<BridgeCommand>(&message.payload) {
            Ok(command) => bridge.lock().await.handle_command(command).await,
            Err(e) => {
                warn!(payload = %message.payload_str(), error = %e, "Invalid command");
                CommandResponse::error(None, e)
            }
        };

        match serde_json::to_vec(&response) {
            Ok(payload) => {
                if let Err(e) = supervisor
                    .publish_to(&response_topic, payload, PublishOptions::default())
                    .await
                {
                    error!(error = %e, "Failed to publish command response");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize command response"),
        }
    }

    debug!("Command channel closed");
}
