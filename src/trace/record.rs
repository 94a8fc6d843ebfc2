//! The generic record handed to a [`TraceSink`](super::sink::TraceSink).

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::level::Severity;
use super::message::{render, MessageArgs, TraceMessage};
use super::value::FieldValue;

/// Keys written for action records, in output order.
pub const ACTION_KEYS: [&str; 8] = [
    "action",
    "event",
    "trace_id",
    "start_time",
    "duration",
    "error",
    "error_type",
    "stacktrace",
];

/// Lifecycle edge of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionEvent {
    Enter,
    Exit,
    Cancel,
    Error,
}

impl ActionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionEvent::Enter => "enter",
            ActionEvent::Exit => "exit",
            ActionEvent::Cancel => "cancel",
            ActionEvent::Error => "error",
        }
    }

    /// Whether this event ends an action's lifecycle
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionEvent::Enter)
    }
}

impl fmt::Display for ActionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields attached to an action lifecycle record.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFields {
    pub action: String,
    pub event: ActionEvent,
    pub trace_id: String,
    /// Wall-clock epoch seconds, `enter` only
    pub start_time: Option<f64>,
    /// Monotonic elapsed seconds, terminal events only
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub stacktrace: Option<String>,
}

impl ActionFields {
    /// Flatten into extra fields, omitting absent ones.
    pub fn into_fields(self) -> Vec<(String, FieldValue)> {
        let mut fields = vec![
            ("action".to_string(), FieldValue::Str(self.action)),
            (
                "event".to_string(),
                FieldValue::Str(self.event.as_str().to_string()),
            ),
            ("trace_id".to_string(), FieldValue::Str(self.trace_id)),
        ];
        let optional = [
            ("start_time", self.start_time.map(FieldValue::Float)),
            ("duration", self.duration.map(FieldValue::Float)),
            ("error", self.error.map(FieldValue::Str)),
            ("error_type", self.error_type.map(FieldValue::Str)),
            ("stacktrace", self.stacktrace.map(FieldValue::Str)),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key.to_string(), v))),
        );
        fields
    }
}

/// One log record, before formatting.
///
/// The message stays unrendered (template plus arguments) until a formatter
/// asks for it, so sinks that filter the record out never pay for rendering.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub created: DateTime<Local>,
    pub severity: Severity,
    pub template: String,
    pub args: MessageArgs,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line: Option<u32>,
    /// Ordered extra fields; the first occurrence of a key wins
    pub extra: Vec<(String, FieldValue)>,
}

impl LogRecord {
    pub fn new(severity: Severity, message: impl Into<TraceMessage>) -> Self {
        let (template, args) = message.into().into_parts();
        Self {
            created: Local::now(),
            severity,
            template,
            args,
            module: None,
            function: None,
            line: None,
            extra: Vec::new(),
        }
    }

    /// Build an action lifecycle record with an already rendered message
    pub fn action(message: String, fields: ActionFields) -> Self {
        let mut record = Self::new(Severity::Trace, message);
        record.extra = fields.into_fields();
        record
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.extra.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Whether this record came from an action scope
    pub fn is_action(&self) -> bool {
        self.severity.is_action_trace() && self.has_field("action")
    }

    /// The message with arguments substituted.
    ///
    /// A template that cannot be rendered is returned as is rather than failing.
    pub fn message(&self) -> String {
        render(&self.template, &self.args).unwrap_or_else(|_| self.template.clone())
    }
}
