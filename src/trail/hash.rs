//! Canonical serialization and content digest.
//!
//! Two serializers can emit the same mapping with different key orders, so
//! the digest is taken over a canonical form: compact JSON with object keys
//! sorted lexicographically at every nesting level.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::record::TrailRecord;

/// Writes `value` as compact JSON with sorted object keys.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use trail_core::canonical_json;
///
/// let value = json!({"b": 1, "a": {"d": [true, null], "c": "x"}});
/// assert_eq!(canonical_json(&value), r#"{"a":{"c":"x","d":[true,null]},"b":1}"#);
/// ```
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, nested)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(nested, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex-encoded SHA-256 over the canonical form of `record`.
///
/// The stored hash is excluded from the input. The previous hash, when
/// present, is included under `prev_hash` so that successive trails chain.
pub(crate) fn digest(record: &TrailRecord, prev_hash: Option<&str>) -> String {
    // Infallible: every map in the record is keyed by strings.
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.remove("hash");
        map.insert(
            "prev_hash".to_string(),
            prev_hash.map_or(Value::Null, Value::from),
        );
    }

    let canonical = canonical_json(&value);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> TrailRecord {
        TrailRecord::new(
            "trace".into(),
            "req".into(),
            "svc".into(),
            "test".into(),
        )
    }

    #[test]
    fn canonical_form_ignores_insertion_order() {
        let mut first = serde_json::Map::new();
        first.insert("zeta".into(), json!(1));
        first.insert("alpha".into(), json!({"y": 2, "x": 1}));

        let mut second = serde_json::Map::new();
        second.insert("alpha".into(), json!({"x": 1, "y": 2}));
        second.insert("zeta".into(), json!(1));

        assert_eq!(
            canonical_json(&Value::Object(first)),
            canonical_json(&Value::Object(second))
        );
    }

    #[test]
    fn canonical_form_escapes_keys_and_strings() {
        let value = json!({"quo\"te": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"quo\"te":"line\nbreak"}"#);
    }

    #[test]
    fn digest_is_hex_sha256() {
        let hash = digest(&record(), None);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_excludes_stored_hash() {
        let plain = record();
        let mut hashed = plain.clone();
        hashed.hash = Some("deadbeef".into());

        assert_eq!(digest(&plain, None), digest(&hashed, None));
    }

    #[test]
    fn previous_hash_changes_digest() {
        let record = record();
        assert_ne!(digest(&record, None), digest(&record, Some("abc")));
        assert_eq!(digest(&record, Some("abc")), digest(&record, Some("abc")));
    }
}
