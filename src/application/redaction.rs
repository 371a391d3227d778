//! Removes authentication material from payloads before they are shown to
//! the user or fed back to the reasoning service.
//!
//! Two passes: fields whose name looks sensitive are replaced wholesale, then
//! any configured secret value still present in the text is scrubbed.

use serde_json::{Map, Value};

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_FIELDS: &[&str] = &[
    "token",
    "secret",
    "password",
    "passwd",
    "api_key",
    "apikey",
    "authorization",
    "cookie",
    "credential",
    "private_key",
    "session",
    "signature",
];

#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// `secrets` are literal values (tokens, keys) that must never be echoed.
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .filter(|s| s.len() >= 4)
            .collect();
        secrets.sort();
        secrets.dedup();
        // Longest first so a secret containing another is scrubbed whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { secrets }
    }

    pub fn is_sensitive_field(name: &str) -> bool {
        let name = name.to_ascii_lowercase().replace('-', "_");
        SENSITIVE_FIELDS.iter().any(|field| name.contains(field))
    }

    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, inner) in map {
                    let redacted = if Self::is_sensitive_field(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        self.redact_value(inner)
                    };
                    out.insert(key.clone(), redacted);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::String(s) => Value::String(self.scrub(s)),
            other => other.clone(),
        }
    }

    pub fn scrub(&self, text: &str) -> String {
        let mut text = text.to_string();
        for secret in &self.secrets {
            if text.contains(secret.as_str()) {
                text = text.replace(secret.as_str(), REDACTED);
            }
        }
        text
    }
}
