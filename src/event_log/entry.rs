//! Log entry model and line codec.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys serialized from the typed fields; never written from `fields`.
pub const RESERVED_KEYS: [&str; 3] = ["deviceId", "timestamp", "event"];

/// One structured event, written once as a single JSON line.
///
/// `device_id` and `event` are expected by convention but not enforced;
/// a line missing them still parses with empty strings. Any other keys
/// land in `fields`, in the order they were written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default)]
    pub device_id: String,

    /// ISO-8601 write time; filled by `EventLog::log` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub event: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    pub fn new(device_id: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: None,
            event: event.into(),
            fields: Map::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(key.into(), value.into());
        self
    }

    /// Set a field. `deviceId`, `timestamp` and `event` overwrite the typed
    /// fields instead of landing in `fields`; a null `timestamp` clears it.
    pub fn set_field(&mut self, key: String, value: Value) {
        match key.as_str() {
            "deviceId" => self.device_id = value_to_string(value),
            "event" => self.event = value_to_string(value),
            "timestamp" => {
                self.timestamp = match value {
                    Value::Null => None,
                    other => Some(value_to_string(other)),
                }
            }
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    /// Move reserved keys inserted directly into `fields` onto the typed fields.
    pub fn normalize(&mut self) {
        for key in RESERVED_KEYS {
            if let Some(value) = self.fields.shift_remove(key) {
                self.set_field(key.to_string(), value);
            }
        }
    }

    fn has_reserved_fields(&self) -> bool {
        RESERVED_KEYS.iter().any(|key| self.fields.contains_key(*key))
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize as one newline-terminated JSON line. Every key appears once.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = if self.has_reserved_fields() {
            let mut entry = self.clone();
            entry.normalize();
            serde_json::to_string(&entry)?
        } else {
            serde_json::to_string(self)?
        };
        line.push('\n');
        Ok(line)
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Format a timestamp the way entries carry it: UTC, millisecond precision, `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in entry timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}
