//! Descriptor lookup by device model.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::descriptor::RegisterDescriptor;

/// Source of register descriptors.
pub trait DescriptorRegistry: Send + Sync + fmt::Debug {
    fn lookup_by_model(&self, model: &str) -> Option<Arc<RegisterDescriptor>>;
}

/// Fixed set of descriptors, usually built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    models: HashMap<String, Arc<RegisterDescriptor>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>, descriptor: RegisterDescriptor) -> Self {
        self.models.insert(model.into(), Arc::new(descriptor));
        self
    }

    /// Model names, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl From<&HashMap<String, ModelConfig>> for StaticRegistry {
    fn from(models: &HashMap<String, ModelConfig>) -> Self {
        models
            .iter()
            .fold(Self::new(), |registry, (name, model)| {
                registry.with_model(name, RegisterDescriptor::from(model))
            })
    }
}

impl DescriptorRegistry for StaticRegistry {
    fn lookup_by_model(&self, model: &str) -> Option<Arc<RegisterDescriptor>> {
        self.models.get(model).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldSpec;

    #[test]
    fn test_lookup() {
        let registry = StaticRegistry::new()
            .with_model("sdm120", RegisterDescriptor::new().with_field("v", FieldSpec::new(0)));

        let descriptor = registry.lookup_by_model("sdm120").unwrap();
        assert_eq!(descriptor.len(), 1);
        assert!(registry.lookup_by_model("sdm630").is_none());
    }

    #[test]
    fn test_lookup_shares_descriptor() {
        let registry = StaticRegistry::new().with_model("m", RegisterDescriptor::new());
        let a = registry.lookup_by_model("m").unwrap();
        let b = registry.lookup_by_model("m").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_from_config() {
        let models: HashMap<String, ModelConfig> = json5::from_str(
            r#"{
                th: { fields: [ { key: "temp", address: 1 }, { key: "hum", address: 2 } ] },
                relay: { fields: [ { key: "on", address: 0, fc: 1 } ] }
            }"#,
        )
        .unwrap();

        let registry = StaticRegistry::from(&models);
        assert_eq!(registry.models(), vec!["relay", "th"]);
        assert_eq!(
            registry.lookup_by_model("th").unwrap().keys().collect::<Vec<_>>(),
            vec!["temp", "hum"]
        );
    }
}
