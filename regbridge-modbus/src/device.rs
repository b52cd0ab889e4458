//! A configured device bound to its descriptor.

use std::sync::Arc;

use crate::config::{ConnectionConfig, DeviceConfig};
use crate::descriptor::RegisterDescriptor;
use crate::error::ModbusError;
use crate::registry::DescriptorRegistry;

/// A pollable device. Immutable once built.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub model: String,
    pub unit_id: u8,
    pub connection: ConnectionConfig,
    pub descriptor: Arc<RegisterDescriptor>,
}

impl Device {
    /// Resolve `config.model` in `registry`.
    pub fn new(config: DeviceConfig, registry: &dyn DescriptorRegistry) -> Result<Self, ModbusError> {
        let descriptor =
            registry
                .lookup_by_model(&config.model)
                .ok_or_else(|| ModbusError::UnknownModel {
                    device: config.id.clone(),
                    model: config.model.clone(),
                })?;

        Ok(Self {
            id: config.id,
            model: config.model,
            unit_id: config.unit_id,
            connection: config.connection,
            descriptor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;

    fn config(model: &str) -> DeviceConfig {
        DeviceConfig {
            id: "meter01".to_string(),
            model: model.to_string(),
            unit_id: 3,
            connection: ConnectionConfig::Tcp {
                host: "10.0.0.5".to_string(),
                port: 502,
            },
        }
    }

    #[test]
    fn test_resolves_model() {
        let registry = StaticRegistry::new().with_model("sdm120", RegisterDescriptor::new());
        let device = Device::new(config("sdm120"), &registry).unwrap();
        assert_eq!(device.id, "meter01");
        assert_eq!(device.unit_id, 3);
    }

    #[test]
    fn test_unknown_model() {
        let registry = StaticRegistry::new();
        let err = Device::new(config("sdm630"), &registry).unwrap_err();
        assert!(matches!(err, ModbusError::UnknownModel { ref model, .. } if model == "sdm630"));
    }
}
