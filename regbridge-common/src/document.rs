//! Nested JSON documents addressed by dotted field paths.
//!
//! A field key such as `"power.voltage"` is split on `.` into path segments.
//! Writing it creates (or reuses) an object at `power` and stores the value at
//! `voltage` inside it. Intermediate values that are missing or are not
//! objects are replaced by empty objects. Empty segments (`"a..b"`, `".a"`,
//! `""`) are rejected.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Store `value` at the dotted `path` inside `root`.
pub fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let segments = split_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(Error::FieldPath(path.to_string()));
    };

    let mut node = root;
    for segment in parents {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = entry
            .as_object_mut()
            .ok_or_else(|| Error::FieldPath(path.to_string()))?;
    }

    node.insert(last.to_string(), value);
    Ok(())
}

/// Look up the value at the dotted `path` inside `root`.
pub fn get_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let segments = split_path(path).ok()?;
    let (last, parents) = segments.split_last()?;

    let mut node = root;
    for segment in parents {
        node = node.get(*segment)?.as_object()?;
    }
    node.get(*last)
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::FieldPath(path.to_string()));
    }
    Ok(segments)
}

/// A JSON object assembled field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value at a dotted path.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        set_path(&mut self.root, path, value)
    }

    /// Read the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.root, path)
    }

    /// Whether the document has no top-level entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Borrow the underlying object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Convert into a `serde_json::Value::Object`.
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Serialize to a compact JSON string. Keys keep insertion order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.root)?)
    }
}
