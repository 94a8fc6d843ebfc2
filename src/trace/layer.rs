//! Bridge from `tracing` events to a [`TraceSink`].
//!
//! ```ignore
//! use tracing_subscriber::prelude::*;
//!
//! let sink = Arc::new(JsonlSink::create(&path)?);
//! tracing_subscriber::registry()
//!     .with(TraceLayer::new(sink.clone()))
//!     .init();
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::level::Severity;
use super::record::LogRecord;
use super::sink::{TraceSink, SINK_TARGET};
use super::value::FieldValue;

/// Key an event's own `action` field is written under.
///
/// A trace line with an `action` key is read back as an action record, so
/// application events must not carry one.
pub const APP_ACTION_KEY: &str = "app_action";

/// A `tracing_subscriber` layer that forwards every event to a sink.
///
/// The event's `message` becomes the record message, its other fields become
/// extra fields, and the module path and line become location context.
/// `TRACE` and `DEBUG` events are both written at [`Severity::Debug`], below
/// the severity reserved for action records.
#[derive(Clone)]
pub struct TraceLayer {
    sink: Arc<dyn TraceSink>,
}

impl TraceLayer {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }
}

impl fmt::Debug for TraceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TraceLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // A sink reporting its own write failure must not feed itself
        if metadata.target() == SINK_TARGET {
            return;
        }
        let severity = Severity::from(*metadata.level());
        if !self.sink.enabled(severity) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(severity, visitor.message.unwrap_or_default());
        record.module = metadata.module_path().map(str::to_string);
        record.line = metadata.line();
        record.extra = visitor.fields;
        self.sink.log(record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, FieldValue)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: FieldValue) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "action" => self.fields.push((APP_ACTION_KEY.to_string(), value)),
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, FieldValue::Float(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, FieldValue::UInt(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, FieldValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, FieldValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, FieldValue::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, FieldValue::Str(format!("{value:?}")));
    }
}
