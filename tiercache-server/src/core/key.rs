//! Cache key derivation
//!
//! Keys have the shape `<operation>:<digest>` where the digest is the first
//! 16 hex characters of a SHA-256 over the payload's canonical JSON form.
//! Only the top-level object keys are sorted; nested objects keep their
//! serialization order, so payloads that differ only in nested key order
//! derive different keys.

use super::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest (64 bits)
pub const DIGEST_HEX_LEN: usize = 16;

/// Derive the cache key for an operation and its input payload
pub fn derive_key<P: Serialize + ?Sized>(operation: &str, payload: &P) -> Result<String> {
    let canonical = canonical_json(payload)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DIGEST_HEX_LEN);

    Ok(format!("{}:{}", operation, digest))
}

/// Prefix shared by every key of an operation
pub fn operation_prefix(operation: &str) -> String {
    format!("{}:", operation)
}

/// Serialize a payload with its top-level keys in lexicographic order
pub fn canonical_json<P: Serialize + ?Sized>(payload: &P) -> Result<String> {
    let value = match serde_json::to_value(payload)? {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().collect::<Map<String, Value>>())
        }
        other => other,
    };

    Ok(serde_json::to_string(&value)?)
}
