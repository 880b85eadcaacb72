//! Base64URL (no padding) and JSON Canonicalization helpers shared by every
//! hash and signature computation in this crate.

use anchorid_core::error::CoreError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64url_decode(s: &str) -> Result<Vec<u8>, CoreError> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| CoreError::InvalidBase64(e.to_string()))
}

/// Recursively sort object keys (byte order) and re-serialize with no
/// insignificant whitespace. This is the canonical form every multihash in
/// this protocol is computed over.
pub fn canonicalize(value: &Value) -> String {
    let sorted = sort_value(value);
    serde_json::to_string(&sorted).expect("canonicalized value always serializes")
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_value(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// Canonicalize `value` as JSON, then SHA2-256-hash it into a Base64URL
/// multihash. The form every `delta_hash`, `recovery_commitment`, and
/// `update_commitment` takes.
pub fn canonicalized_multihash(value: &Value) -> String {
    crate::multihash::hash_to_multihash(canonicalize(value).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_at_every_level() {
        let v = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonicalize(&v), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn base64url_round_trips() {
        let encoded = base64url_encode(b"\xff\xfe\x00");
        assert_eq!(base64url_decode(&encoded).unwrap(), b"\xff\xfe\x00");
    }
}
