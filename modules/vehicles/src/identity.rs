//! Deterministic content-hash identity for generated entities
//!
//! The identity must be stable across process restarts and across
//! implementations: same canonicalization (recursive key-sort, compact JSON)
//! and same digest (SHA-256, lowercase hex) everywhere, or the idempotent
//! re-insertion guarantee breaks system-wide.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Derive the aggregate identity for a field map
///
/// Key order of the input is irrelevant; only field names and values count.
pub fn derive_identity(fields: &Value) -> String {
    let canonical = canonicalize(fields);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compact JSON serialization with object keys sorted recursively
fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).expect("JSON value serialization is infallible")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sort_keys(v))).collect();
            serde_json::to_value(sorted).expect("JSON value serialization is infallible")
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_is_deterministic() {
        let fields = json!({
            "type": "SUV",
            "powerSource": "Electric",
            "hp": 320,
            "year": 2021,
            "topSpeed": 210
        });

        assert_eq!(derive_identity(&fields), derive_identity(&fields));
    }

    #[test]
    fn test_identity_ignores_key_order() {
        let a = json!({"type": "Van", "hp": 150, "year": 2019});
        let b = json!({"year": 2019, "hp": 150, "type": "Van"});

        assert_eq!(derive_identity(&a), derive_identity(&b));
    }

    #[test]
    fn test_identity_changes_with_any_field() {
        let base = json!({"type": "Van", "hp": 150, "year": 2019});
        let changed_value = json!({"type": "Van", "hp": 151, "year": 2019});
        let changed_key = json!({"type": "Van", "horsepower": 150, "year": 2019});

        assert_ne!(derive_identity(&base), derive_identity(&changed_value));
        assert_ne!(derive_identity(&base), derive_identity(&changed_key));
    }

    #[test]
    fn test_identity_shape() {
        let id = derive_identity(&json!({"type": "SUV"}));

        // Lowercase hex SHA-256
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
