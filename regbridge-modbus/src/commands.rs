//! Bridge command protocol.
//!
//! Commands arrive as JSON on `<base>/bridge/request`; each gets a
//! [`CommandResponse`] on `<base>/bridge/response`.

use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;

/// Command sent to the bridge over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Start polling a new device.
    AddDevice {
        /// Device configuration.
        device: DeviceConfig,
    },
    /// Stop polling a device.
    RemoveDevice {
        /// Device ID to remove.
        id: String,
    },
    /// Request the list of polled devices.
    ListDevices,
}

impl BridgeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeCommand::AddDevice { .. } => "add_device",
            BridgeCommand::RemoveDevice { .. } => "remove_device",
            BridgeCommand::ListDevices => "list_devices",
        }
    }
}

/// A polled device, as reported by `list_devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub model: String,
    pub unit_id: u8,
    pub connection: String,
}

/// Response to a [`BridgeCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Command name, if the request could be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceSummary>>,
}

impl CommandResponse {
    pub fn ok(command: &BridgeCommand) -> Self {
        Self {
            command: Some(command.name().to_string()),
            ok: true,
            error: None,
            devices: None,
        }
    }

    pub fn error(command: Option<&BridgeCommand>, error: impl ToString) -> Self {
        Self {
            command: command.map(|c| c.name().to_string()),
            ok: false,
            error: Some(error.to_string()),
            devices: None,
        }
    }

    pub fn with_devices(mut self, devices: Vec<DeviceSummary>) -> Self {
        self.devices = Some(devices);
        self
    }
}
