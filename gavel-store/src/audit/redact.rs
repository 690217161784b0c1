//! Sensitive-field redaction
//!
//! Field names in the fixed sensitive set are replaced with a fixed marker,
//! recursively through nested objects and arrays. Redaction runs after diff
//! computation, so a change to a sensitive field is still recorded — only
//! its value is hidden.

use serde_json::Value;

/// Marker stored in place of any sensitive value. Irreversible.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Field names whose values never reach the audit trail.
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "password_hash",
    "hash_pass",
    "secret",
    "client_secret",
    "token",
    "access_token",
    "refresh_token",
    "api_key",
    "credentials",
];

fn is_sensitive(field: &str) -> bool {
    SENSITIVE_FIELDS
        .iter()
        .any(|name| field.eq_ignore_ascii_case(name))
}

/// Redact `value` in place.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (field, nested) in map.iter_mut() {
                if is_sensitive(field) {
                    *nested = Value::String(REDACTION_MARKER.to_string());
                } else {
                    redact(nested);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact(item);
            }
        }
        _ => {}
    }
}

/// Owned convenience wrapper around [`redact`].
pub fn redacted(mut value: Value) -> Value {
    redact(&mut value);
    value
}
