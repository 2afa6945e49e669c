//! Checksum utilities for stable cache keys

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum over canonical JSON
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn from_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Compute checksum from JSON value (canonicalized)
    ///
    /// Object keys are sorted recursively first, so two schemas that differ
    /// only in key order hash identically.
    pub fn from_json(value: &Value) -> Self {
        let canonical = serde_json::to_string(&canonicalize(value)).unwrap_or_default();
        Self::from_str(&canonical)
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recursively sort object keys
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(obj.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&obj[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_consistency() {
        let content = r#"{"type": "string"}"#;
        assert_eq!(Checksum::from_str(content), Checksum::from_str(content));
    }

    #[test]
    fn test_checksum_ignores_key_order() {
        let a = json!({"type": "string", "format": "uri", "items": {"b": 1, "a": 2}});
        let b = json!({"items": {"a": 2, "b": 1}, "format": "uri", "type": "string"});
        assert_eq!(Checksum::from_json(&a), Checksum::from_json(&b));
    }

    #[test]
    fn test_checksum_different_content() {
        let a = json!({"type": "string"});
        let b = json!({"type": "integer"});
        assert_ne!(Checksum::from_json(&a), Checksum::from_json(&b));
    }

    #[test]
    fn test_canonicalize_keeps_array_order() {
        let value = json!({"enum": ["b", "a"]});
        assert_eq!(canonicalize(&value)["enum"], json!(["b", "a"]));
    }
}
