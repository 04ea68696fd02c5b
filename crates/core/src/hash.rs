//! Stable hashing helpers.
//!
//! Everything here must produce the same output on every platform and
//! toolchain, since split assignment and dedup depend on it.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::Payload;

/// Hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

/// Canonical JSON of a payload object.
pub fn canonical_json_object(payload: &Payload) -> String {
    let mut keys: Vec<&String> = payload.keys().collect();
    keys.sort();
    let mut out = serde_json::Map::new();
    for key in keys {
        out.insert(key.clone(), sorted(&payload[key]));
    }
    Value::Object(out).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Derive a sub-seed from a base seed and a label.
///
/// Used to give each source and each split an independent RNG stream.
pub fn derive_seed(seed: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
