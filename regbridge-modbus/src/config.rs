//! Configuration for the Modbus bridge.

use std::collections::HashMap;
use std::time::Duration;

use regbridge_framework::{BridgeConfig, BridgeError, BusConfig, LoggingConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::DecodeConfig;
use crate::descriptor::{DEFAULT_FUNCTION_CODE, DEFAULT_LENGTH, FunctionCode};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation(msg) => BridgeError::ConfigValidation(msg),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusBridgeConfig {
    /// Message bus connection settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Modbus-specific settings
    pub modbus: ModbusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig for ModbusBridgeConfig {
    fn bus(&self) -> &BusConfig {
        &self.bus
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> regbridge_framework::Result<()> {
        self.bus.validate()?;
        self.modbus.validate()?;
        Ok(())
    }
}

/// Modbus protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Delay between poll cycles of one device, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout of a single register read, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Timeout for opening a device connection, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Devices to poll
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Register models, by name
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

impl ModbusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// Devices referring to unknown models are accepted here; they fail when
    /// added to the bridge.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let mut ids = std::collections::HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !ids.insert(device.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device id '{}'",
                    device.id
                )));
            }
        }

        for (name, model) in &self.models {
            model
                .validate()
                .map_err(|e| ConfigError::Validation(format!("Model '{}': {}", name, e)))?;
        }

        Ok(())
    }
}

/// Configuration for a single Modbus device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device id, also the topic the device's documents are published on
    pub id: String,

    /// Name of the register model describing this device
    pub model: String,

    /// Modbus unit/slave ID
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Connection type and address
    pub connection: ConnectionConfig,
}

fn default_unit_id() -> u8 {
    1
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        regbridge_common::validate_segment(&self.id)
            .map_err(|e| ConfigError::Validation(format!("Device id '{}': {}", self.id, e)))?;

        if self.model.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Device '{}': model cannot be empty",
                self.id
            )));
        }

        if let ConnectionConfig::Rtu { parity, .. } = &self.connection {
            match parity.to_lowercase().as_str() {
                "none" | "even" | "odd" => {}
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': invalid parity '{}' (use none, even, or odd)",
                        self.id, parity
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl ConnectionConfig {
    /// Identity of the underlying link.
    ///
    /// Devices with equal keys share one session. Serial line settings are
    /// not part of the key: one port is one bus.
    pub fn session_key(&self) -> String {
        match self {
            ConnectionConfig::Tcp { host, port } => format!("tcp://{}:{}", host, port),
            ConnectionConfig::Rtu { port, .. } => format!("rtu://{}", port),
        }
    }
}

/// A register model: the fields read from every device of this model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Fields, read in this order
    pub fields: Vec<FieldConfig>,
}

impl ModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut keys = std::collections::HashSet::new();
        for field in &self.fields {
            field.validate()?;
            if !keys.insert(field.key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate field key '{}'",
                    field.key
                )));
            }
        }
        Ok(())
    }
}

/// One field of a register model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Output key; dots nest (`"power.voltage"`)
    pub key: String,

    /// Starting address (0-based)
    pub address: u16,

    /// Function code (default: 4, read input registers)
    #[serde(default = "default_function_code")]
    pub fc: u8,

    /// Number of registers or bits to read (default: 1)
    #[serde(default = "default_length")]
    pub len: u16,

    /// How to turn the read into a value; the first register if absent
    #[serde(default)]
    pub decode: Option<DecodeConfig>,
}

fn default_function_code() -> u8 {
    DEFAULT_FUNCTION_CODE
}

fn default_length() -> u16 {
    DEFAULT_LENGTH
}

impl FieldConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() || self.key.split('.').any(str::is_empty) {
            return Err(ConfigError::Validation(format!(
                "invalid field key '{}'",
                self.key
            )));
        }

        if self.len == 0 {
            return Err(ConfigError::Validation(format!(
                "field '{}': len must be at least 1",
                self.key
            )));
        }

        if FunctionCode::try_from(self.fc).is_err() {
            // Unknown codes are reported on every read.
            tracing::warn!(field = %self.key, fc = self.fc, "Unsupported function code");
        }

        if let Some(decode) = &self.decode {
            let needed = decode.data_type.registers();
            if self.len < needed {
                return Err(ConfigError::Validation(format!(
                    "field '{}': {:?} needs len >= {}",
                    self.key, decode.data_type, needed
                )));
            }
        }

        Ok(())
    }
}
