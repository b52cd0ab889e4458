//! Value decoders built from declarative `decode` settings.
//!
//! Every decoder is a [`DecodeFn`]: it sees the first register (or bit) as
//! the interpreted value and the raw read as big-endian bytes, and returns
//! the JSON value to publish.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::descriptor::DecodeFn;

/// Decoding failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Buffer too short: need {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },
    #[error("Decoded value {0} is not a finite number")]
    NotFinite(f64),
    #[error("{0}")]
    Invalid(String),
}

/// Interpretation of the raw read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 16-bit integer (default)
    #[default]
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer (2 registers, big-endian)
    U32,
    /// Signed 32-bit integer (2 registers, big-endian)
    I32,
    /// 32-bit float (2 registers, big-endian)
    F32,
    /// Unsigned 32-bit integer (2 registers, little-endian word order)
    U32Le,
    /// Signed 32-bit integer (2 registers, little-endian word order)
    I32Le,
    /// 32-bit float (2 registers, little-endian word order)
    F32Le,
    /// Non-zero first register or bit
    Bool,
}

impl DataType {
    /// Registers needed for one value.
    pub fn registers(&self) -> u16 {
        match self {
            DataType::U16 | DataType::I16 | DataType::Bool => 1,
            DataType::U32
            | DataType::I32
            | DataType::F32
            | DataType::U32Le
            | DataType::I32Le
            | DataType::F32Le => 2,
        }
    }
}

/// Declarative decoder: `type`, then `value * scale + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    #[serde(rename = "type", default)]
    pub data_type: DataType,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            data_type: DataType::default(),
            scale: default_scale(),
            offset: 0.0,
        }
    }
}

impl DecodeConfig {
    /// Build the decode function.
    pub fn build(&self) -> DecodeFn {
        let config = self.clone();
        Arc::new(move |value, buffer| config.decode(value, buffer))
    }

    /// Decode one read.
    pub fn decode(&self, value: u16, buffer: &[u8]) -> Result<Value, DecodeError> {
        let raw = match self.data_type {
            DataType::Bool => return Ok(Value::Bool(value != 0)),
            DataType::U16 => Raw::Int(i64::from(value)),
            DataType::I16 => Raw::Int(i64::from(value as i16)),
            DataType::U32 => Raw::Int(i64::from(u32::from_be_bytes(word_pair(buffer, false)?))),
            DataType::I32 => Raw::Int(i64::from(i32::from_be_bytes(word_pair(buffer, false)?))),
            DataType::F32 => Raw::Float(f64::from(f32::from_be_bytes(word_pair(buffer, false)?))),
            DataType::U32Le => Raw::Int(i64::from(u32::from_be_bytes(word_pair(buffer, true)?))),
            DataType::I32Le => Raw::Int(i64::from(i32::from_be_bytes(word_pair(buffer, true)?))),
            DataType::F32Le => {
                Raw::Float(f64::from(f32::from_be_bytes(word_pair(buffer, true)?)))
            }
        };

        let unscaled = self.scale == 1.0 && self.offset == 0.0;
        match raw {
            Raw::Int(v) if unscaled => Ok(Value::from(v)),
            Raw::Int(v) => to_number(v as f64 * self.scale + self.offset),
            Raw::Float(v) => to_number(v * self.scale + self.offset),
        }
    }
}

enum Raw {
    Int(i64),
    Float(f64),
}

/// First two registers as big-endian bytes, optionally word-swapped.
fn word_pair(buffer: &[u8], swap_words: bool) -> Result<[u8; 4], DecodeError> {
    let bytes: [u8; 4] = buffer
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::ShortBuffer {
            needed: 4,
            got: buffer.len(),
        })?;

    Ok(if swap_words {
        [bytes[2], bytes[3], bytes[0], bytes[1]]
    } else {
        bytes
    })
}

fn to_number(value: f64) -> Result<Value, DecodeError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or(DecodeError::NotFinite(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(config: &str, value: u16, buffer: &[u8]) -> Result<Value, DecodeError> {
        let config: DecodeConfig = json5::from_str(config).unwrap();
        (config.build())(value, buffer)
    }

    #[test]
    fn test_u16_default() {
        assert_eq!(decode("{}", 235, &[0x00, 0xEB]).unwrap(), json!(235));
    }

    #[test]
    fn test_scale_and_offset() {
        // 1000 * 0.1 - 50 = 50
        let value = decode(r#"{ type: "u16", scale: 0.1, offset: -50 }"#, 1000, &[]).unwrap();
        assert_eq!(value.as_f64().unwrap(), 50.0);
    }

    #[test]
    fn test_i16_negative() {
        assert_eq!(decode(r#"{ type: "i16" }"#, 0xFFFE, &[]).unwrap(), json!(-2));
    }

    #[test]
    fn test_f32_big_endian() {
        // 123.456 in IEEE 754 = 0x42F6E979
        let value = decode(r#"{ type: "f32" }"#, 0x42F6, &[0x42, 0xF6, 0xE9, 0x79]).unwrap();
        assert!((value.as_f64().unwrap() - 123.456).abs() < 0.001);
    }

    #[test]
    fn test_f32_word_swapped() {
        let value = decode(r#"{ type: "f32le" }"#, 0xE979, &[0xE9, 0x79, 0x42, 0xF6]).unwrap();
        assert!((value.as_f64().unwrap() - 123.456).abs() < 0.001);
    }

    #[test]
    fn test_32_bit_integers() {
        let buffer = [0x00, 0x01, 0x00, 0x02];
        assert_eq!(decode(r#"{ type: "u32" }"#, 1, &buffer).unwrap(), json!(0x0001_0002));
        assert_eq!(decode(r#"{ type: "u32le" }"#, 1, &buffer).unwrap(), json!(0x0002_0001));
        assert_eq!(
            decode(r#"{ type: "i32" }"#, 0xFFFF, &[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            json!(-1)
        );
    }

    #[test]
    fn test_bool() {
        assert_eq!(decode(r#"{ type: "bool" }"#, 1, &[0x01]).unwrap(), json!(true));
        assert_eq!(decode(r#"{ type: "bool" }"#, 0, &[0x00]).unwrap(), json!(false));
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(
            decode(r#"{ type: "u32" }"#, 1, &[0x00, 0x01]),
            Err(DecodeError::ShortBuffer { needed: 4, got: 2 })
        );
    }

    #[test]
    fn test_nan_rejected() {
        let nan = f32::NAN.to_be_bytes();
        assert!(matches!(
            decode(r#"{ type: "f32" }"#, 0, &nan),
            Err(DecodeError::NotFinite(_))
        ));
    }

    #[test]
    fn test_decode_is_pure() {
        let decode = DecodeConfig {
            data_type: DataType::U16,
            scale: 0.1,
            offset: 0.0,
        }
        .build();
        let first = decode(235, &[0x00, 0xEB]).unwrap();
        let second = decode(235, &[0x00, 0xEB]).unwrap();
        assert_eq!(first, second);
    }
}
