//! Renders log records as single-line JSON objects.

use chrono::{DateTime, Local, SecondsFormat};
use serde_json::{Map, Value};

use super::record::{LogRecord, ACTION_KEYS};

/// Record metadata names that are never copied from the extra fields.
pub const RESERVED_KEYS: [&str; 12] = [
    "args", "created", "extra", "file", "function", "line", "module", "name", "severity",
    "target", "template", "thread",
];

/// Formats a [`LogRecord`] as one line of JSON.
///
/// Every line carries `timestamp`, `level` and `message`. Records below the
/// action-trace severity also get `module`/`function`/`line` when known.
/// Action records get the fixed action keys first. Remaining extra fields
/// follow in insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceFormatter;

impl TraceFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, record: &LogRecord) -> String {
        // Display on Value is infallible: keys are strings and every
        // FieldValue has already been reduced to plain JSON
        Value::Object(self.to_json_object(record)).to_string()
    }

    pub fn to_json_object(&self, record: &LogRecord) -> Map<String, Value> {
        let mut output = Map::new();
        output.insert(
            "timestamp".to_string(),
            Value::String(self.format_time(&record.created)),
        );
        output.insert(
            "level".to_string(),
            Value::String(record.severity.as_str().to_string()),
        );
        output.insert("message".to_string(), Value::String(record.message()));

        if !record.severity.is_action_trace() {
            if let Some(module) = &record.module {
                output.insert("module".to_string(), Value::String(module.clone()));
            }
            if let Some(function) = &record.function {
                output.insert("function".to_string(), Value::String(function.clone()));
            }
            if let Some(line) = record.line {
                output.insert("line".to_string(), Value::from(line));
            }
        } else if record.has_field("action") {
            for key in ACTION_KEYS {
                if let Some(value) = record.field(key) {
                    output.insert(key.to_string(), value.to_json());
                }
            }
        }

        for (key, value) in &record.extra {
            if output.contains_key(key) || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            output.insert(key.clone(), value.to_json());
        }

        output
    }

    /// Local time, ISO-8601 with microseconds and offset
    pub fn format_time(&self, created: &DateTime<Local>) -> String {
        created.to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}
