//! Canonical hashing.
//!
//! Canonical form: object keys sorted, `null` members dropped (absent and
//! null are the same), arrays kept in order. Callers sort arrays whose order
//! carries no meaning before hashing them.

use decisionflow_core::ClarificationAnswer;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Return the canonical form of a JSON value.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                let member = &map[key];
                if member.is_null() {
                    continue;
                }
                out.insert(key.clone(), canonicalize(member));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize a value in canonical form.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Hash any serializable value through its canonical JSON form.
pub fn hash_serializable<T: Serialize + ?Sized>(value: &T) -> String {
    hash_value(&serde_json::to_value(value).unwrap_or(Value::Null))
}

/// Hash a sequence of text parts. Each part is length-prefixed so that
/// `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash clarification answers independent of the order they arrived in.
pub fn hash_clarifications(answers: &[ClarificationAnswer]) -> String {
    let mut sorted: Vec<&ClarificationAnswer> = answers.iter().collect();
    sorted.sort_by(|a, b| {
        a.question_id
            .cmp(&b.question_id)
            .then_with(|| a.answer.cmp(&b.answer))
    });
    hash_serializable(&sorted)
}
