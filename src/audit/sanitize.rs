//! Parameter sanitization for audit logging.
//!
//! Turns a raw `Authorization` header into a JSON object and redacts the
//! values that let a reader reconstruct or replay a credential.

use serde_json::{Map, Value};

use crate::protocol::{parse_params, strip_digest_scheme};

/// Keys whose values are redacted. Matched as substrings of the key.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "credential",
    "authorization",
    "response",
    "cnonce",
];

/// Maximum length for string values before truncation.
const MAX_STRING_LENGTH: usize = 512;

/// Sanitize parameters for audit logging.
///
/// Redacts values for sensitive keys and truncates oversized strings,
/// recursing through nested objects and arrays.
pub fn sanitize_params(params: &Value) -> Value {
    match params {
        Value::Object(map) => {
            let mut sanitized = Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|&s| key_lower.contains(s)) {
                    sanitized.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    sanitized.insert(key.clone(), sanitize_params(val));
                }
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_params).collect()),
        Value::String(s) if s.len() > MAX_STRING_LENGTH => {
            Value::String(format!("[TRUNCATED - {} bytes]", s.len()))
        }
        _ => params.clone(),
    }
}

/// Sanitized JSON view of an `Authorization` header.
///
/// Digest parameters become object fields. Other schemes are recorded by
/// name only, and unparseable digest credentials are flagged.
pub fn authorization_params(header: Option<&str>) -> Value {
    let header = match header {
        Some(header) => header,
        None => return Value::Object(Map::new()),
    };

    let params = match strip_digest_scheme(header) {
        Some(params) => params,
        None => {
            let scheme = header.split_whitespace().next().unwrap_or("");
            return serde_json::json!({ "scheme": scheme });
        }
    };

    match parse_params(params) {
        Ok(map) => {
            let object: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            sanitize_params(&Value::Object(object))
        }
        Err(e) => serde_json::json!({ "scheme": "Digest", "parse_error": e.to_string() }),
    }
}
