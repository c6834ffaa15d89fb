//! Canonical JSON encoding and SHA-256 digests.
//!
//! Timelines and artifacts are fingerprinted through their canonical JSON
//! form: object keys sorted, no insignificant whitespace, non-finite numbers
//! rejected (serde_json refuses to encode them).

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::error::Result;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Canonical JSON bytes of `value` with recursively sorted object keys.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let tree = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&tree)?)
}

/// SHA-256 hex digest of the canonical JSON encoding of `value`.
pub fn digest_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(&canonical_json(value)?))
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}
