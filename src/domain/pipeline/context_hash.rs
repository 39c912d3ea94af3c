//! Deterministic context hashing.
//!
//! The hash covers the caller-visible inputs a reply depends on. Objects are
//! serialized with sorted keys, so two equal inputs always hash identically
//! regardless of how their maps were built.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::EventKind;

/// Inputs folded into a context hash.
#[derive(Debug, Clone, Serialize)]
pub struct ContextHashInput<'a> {
    pub caller_id: &'a str,
    pub session_id: &'a str,
    pub kind: EventKind,
    pub plan: &'a str,
    pub payload: &'a Value,
    pub session_state: Option<&'a Value>,
    pub memory_excerpts: &'a [String],
}

/// SHA-256 of the canonical JSON rendering of `input`, lowercase hex.
pub fn context_hash(input: &ContextHashInput<'_>) -> String {
    let value = serde_json::to_value(input).unwrap_or(Value::Null);
    hash_value(&value)
}

/// SHA-256 of the canonical JSON rendering of `value`, lowercase hex.
pub fn hash_value(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    fn input<'a>(payload: &'a Value, excerpts: &'a [String]) -> ContextHashInput<'a> {
        ContextHashInput {
            caller_id: "caller-1",
            session_id: "session-1",
            kind: EventKind::Chat,
            plan: "pro",
            payload,
            session_state: None,
            memory_excerpts: excerpts,
        }
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let payload = json!({"message": "hi"});
        let hash = context_hash(&input(&payload, &[]));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn excerpts_change_the_hash() {
        let payload = json!({"message": "hi"});
        let excerpts = vec!["likes tea".to_string()];
        assert_ne!(
            context_hash(&input(&payload, &[])),
            context_hash(&input(&payload, &excerpts))
        );
    }

    #[test]
    fn nested_objects_are_canonicalised() {
        let a = json!({"b": {"y": 1, "x": [true, null]}, "a": "s"});
        let mut out = String::new();
        write_canonical(&a, &mut out);
        assert_eq!(out, r#"{"a":"s","b":{"x":[true,null],"y":1}}"#);
    }

    proptest! {
        #[test]
        fn hash_ignores_key_insertion_order(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12)
        ) {
            let mut forward = Map::new();
            for (k, v) in entries.iter() {
                forward.insert(k.clone(), json!(v));
            }
            let mut backward = Map::new();
            for (k, v) in entries.iter().rev() {
                backward.insert(k.clone(), json!(v));
            }
            prop_assert_eq!(
                hash_value(&Value::Object(forward)),
                hash_value(&Value::Object(backward))
            );
        }

        #[test]
        fn hash_is_stable_across_calls(message in ".{0,64}", priority in 0u8..=10) {
            let payload = json!({"message": message, "priority": priority});
            let first = context_hash(&input(&payload, &[]));
            let second = context_hash(&input(&payload.clone(), &[]));
            prop_assert_eq!(first, second);
        }
    }
}
