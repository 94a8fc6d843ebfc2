pub mod config;
pub mod trace;
pub mod util;

pub use config::{ConfigError, TraceConfig};
pub use trace::{
    read_trace_file, register_error_kind, trace_message, ActionEvent, ActionOutcome, ActionScope, ActionTraceRecord,
    ActionTracer, Cancelled, FieldValue, JsonlSink, LogRecord, MemorySink, Severity,
    SimpleTraceRecord, TraceFileError, TraceFormatter, TraceLayer, TraceMessage, TraceRecord,
    TraceSink,
};
pub use util::{data_dir, init_data_dir, traces_dir};
