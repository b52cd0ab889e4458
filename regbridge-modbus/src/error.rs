//! Error types for the Modbus bridge.

use std::any::Any;
use std::time::Duration;

use regbridge_framework::BridgeError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::decode::DecodeError;

/// Bridge-level errors.
#[derive(Debug, Error)]
pub enum ModbusError {
    #[error("Device '{device}': unknown model '{model}'")]
    UnknownModel { device: String, model: String },
    #[error("Device '{0}' already exists")]
    DuplicateDevice(String),
    #[error("Device '{0}' not found")]
    UnknownDevice(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Errors raised by a device transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Device exception: {0}")]
    Exception(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single field produced no value.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Unknown function code {0}")]
    UnknownFunctionCode(u8),
    #[error("Read failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
    #[error("Empty response")]
    Empty,
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Decode panicked: {0}")]
    DecodePanic(String),
}

/// Why a poll cycle was abandoned.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to address unit {unit_id}: {source}")]
    Addressing {
        unit_id: u8,
        #[source]
        source: TransportError,
    },
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] regbridge_common::Error),
    #[error("Publish failed: {0}")]
    Publish(#[from] BridgeError),
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
