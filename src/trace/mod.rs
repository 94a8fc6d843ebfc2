//! Action tracing: scoped lifecycle records, JSON line formatting, and
//! typed readback of trace files.
//!
//! ```text
//! ActionScope ──▶ TraceSink ──▶ TraceFormatter ──▶ trace-<pid>.log ──▶ read_trace_file
//! ```

pub mod action;
pub mod format;
pub mod id;
pub mod layer;
pub mod level;
pub mod message;
pub mod reader;
pub mod record;
pub mod sink;
pub mod value;

pub use action::{
    register_error_kind, trace_message, ActionOutcome, ActionScope, ActionTracer, Cancelled,
    Failure,
};
pub use format::TraceFormatter;
pub use id::new_trace_id;
pub use layer::{TraceLayer, APP_ACTION_KEY};
pub use level::Severity;
pub use message::{MessageArgs, RenderError, TraceMessage, MAX_FIELD_WIDTH};
pub use reader::{
    read_trace_file, read_trace_records, write_trace_file, ActionTraceRecord, SimpleTraceRecord,
    TraceFileError, TraceRecord,
};
pub use record::{ActionEvent, ActionFields, LogRecord};
pub use sink::{JsonlSink, MemorySink, TraceSink};
pub use value::FieldValue;
