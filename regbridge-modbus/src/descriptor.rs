//! Register descriptors: which registers make up a device's document.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::ModelConfig;
use crate::decode::DecodeError;

/// Function code used when a field does not name one.
pub const DEFAULT_FUNCTION_CODE: u8 = 4;

/// Registers read when a field does not give a length.
pub const DEFAULT_LENGTH: u16 = 1;

/// Turns `(interpreted value, raw buffer)` into the published value.
///
/// Must be pure: the same inputs always give the same output.
pub type DecodeFn = Arc<dyn Fn(u16, &[u8]) -> Result<Value, DecodeError> + Send + Sync>;

/// Supported read operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 1,
    ReadDiscreteInputs = 2,
    ReadHoldingRegisters = 3,
    ReadInputRegisters = 4,
}

impl FunctionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionCode::ReadCoils => "coils",
            FunctionCode::ReadDiscreteInputs => "discrete_inputs",
            FunctionCode::ReadHoldingRegisters => "holding_registers",
            FunctionCode::ReadInputRegisters => "input_registers",
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(FunctionCode::ReadCoils),
            2 => Ok(FunctionCode::ReadDiscreteInputs),
            3 => Ok(FunctionCode::ReadHoldingRegisters),
            4 => Ok(FunctionCode::ReadInputRegisters),
            other => Err(other),
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> Self {
        code as u8
    }
}

/// How to read one field.
#[derive(Clone)]
pub struct FieldSpec {
    pub address: u16,
    /// Kept raw so that unsupported codes surface when read.
    pub function_code: u8,
    pub length: u16,
    pub decode: Option<DecodeFn>,
}

impl FieldSpec {
    /// A field at `address` with the default function code and length.
    pub fn new(address: u16) -> Self {
        Self {
            address,
            function_code: DEFAULT_FUNCTION_CODE,
            length: DEFAULT_LENGTH,
            decode: None,
        }
    }

    pub fn with_function_code(mut self, code: impl Into<u8>) -> Self {
        self.function_code = code.into();
        self
    }

    pub fn with_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    pub fn with_decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(u16, &[u8]) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        self.decode = Some(Arc::new(decode));
        self
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("address", &self.address)
            .field("function_code", &self.function_code)
            .field("length", &self.length)
            .field("decode", &self.decode.is_some())
            .finish()
    }
}

/// Ordered field list for one device model.
#[derive(Debug, Clone, Default)]
pub struct RegisterDescriptor {
    fields: Vec<(String, FieldSpec)>,
}

impl RegisterDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Fields are read in insertion order.
    pub fn with_field(mut self, key: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((key.into(), spec));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(key, spec)| (key.as_str(), spec))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<&ModelConfig> for RegisterDescriptor {
    fn from(model: &ModelConfig) -> Self {
        model.fields.iter().fold(Self::new(), |descriptor, field| {
            let mut spec = FieldSpec::new(field.address)
                .with_function_code(field.fc)
                .with_length(field.len);
            spec.decode = field.decode.as_ref().map(|d| d.build());
            descriptor.with_field(&field.key, spec)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;

    #[test]
    fn test_field_defaults() {
        let spec = FieldSpec::new(10);
        assert_eq!(spec.function_code, 4);
        assert_eq!(spec.length, 1);
        assert!(spec.decode.is_none());
    }

    #[test]
    fn test_function_code_conversion() {
        assert_eq!(FunctionCode::try_from(3), Ok(FunctionCode::ReadHoldingRegisters));
        assert_eq!(FunctionCode::try_from(7), Err(7));
        assert_eq!(u8::from(FunctionCode::ReadCoils), 1);
    }

    #[test]
    fn test_descriptor_keeps_order() {
        let descriptor = RegisterDescriptor::new()
            .with_field("b", FieldSpec::new(1))
            .with_field("a", FieldSpec::new(0))
            .with_field("c.d", FieldSpec::new(2));

        assert_eq!(descriptor.keys().collect::<Vec<_>>(), vec!["b", "a", "c.d"]);
        assert_eq!(descriptor.len(), 3);
    }

    #[test]
    fn test_descriptor_from_model() {
        let model = ModelConfig {
            fields: vec![
                FieldConfig {
                    key: "temp".to_string(),
                    address: 10,
                    fc: 3,
                    len: 2,
                    decode: Some(json5::from_str(r#"{ type: "i32", scale: 0.1 }"#).unwrap()),
                },
                FieldConfig {
                    key: "alarm".to_string(),
                    address: 0,
                    fc: 1,
                    len: 1,
                    decode: None,
                },
            ],
        };

        let descriptor = RegisterDescriptor::from(&model);
        let fields: Vec<_> = descriptor.fields().collect();
        assert_eq!(fields[0].0, "temp");
        assert_eq!(fields[0].1.function_code, 3);
        assert_eq!(fields[0].1.length, 2);
        assert!(fields[0].1.decode.is_some());
        assert_eq!(fields[1].0, "alarm");
        assert!(fields[1].1.decode.is_none());
    }

    #[test]
    fn test_debug_hides_closure() {
        let spec = FieldSpec::new(1).with_decode(|v, _| Ok(Value::from(v)));
        let debug = format!("{:?}", spec);
        assert!(debug.contains("decode: true"));
    }
}
