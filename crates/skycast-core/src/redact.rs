//! Sensitive-data filtering for log output.
//!
//! Provider credentials travel as query parameters (`key`, `appid`), so every
//! request/response payload is passed through [`filter_sensitive`] before it
//! reaches a log line.

use serde_json::{Map, Value};

/// Replacement written in place of a denylisted value.
pub const REDACTED: &str = "[REDACTED]";

/// Omission marker appended by [`preview`].
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Keys whose values are never logged. Compared case-insensitively.
const SENSITIVE_KEYS: &[&str] = &[
    "key",
    "api_key",
    "apikey",
    "api-key",
    "x-api-key",
    "appid",
    "app_id",
    "app-id",
];

/// Whether a map key names a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.trim().to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
}

/// Return a copy of `value` with every denylisted key masked.
///
/// Strings holding an encoded JSON object or array are decoded and filtered;
/// any other string passes through untouched.
pub fn filter_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(filter_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(filter_sensitive).collect()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => filter_sensitive(&parsed),
            _ => value.clone(),
        },
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

/// Filter a list of query parameters into a loggable JSON object.
pub fn filter_params(params: &[(String, String)]) -> Value {
    let map = params
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTED.to_owned())
            } else {
                filter_sensitive(&Value::String(value.clone()))
            };
            (key.clone(), value)
        })
        .collect::<Map<String, Value>>();
    Value::Object(map)
}

fn filter_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let filtered = if is_sensitive_key(key) {
                Value::String(REDACTED.to_owned())
            } else {
                filter_sensitive(value)
            };
            (key.clone(), filtered)
        })
        .collect()
}

/// Render `value` for a log line, cut to `limit` characters.
pub fn preview(value: &Value, limit: usize) -> String {
    let rendered = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    truncate(&rendered, limit)
}

/// Cut `text` to at most `limit` characters including the omission marker.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut cut = text.chars().take(keep).collect::<String>();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
