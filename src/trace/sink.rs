//! Destinations for log records.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::format::TraceFormatter;
use super::level::Severity;
use super::record::LogRecord;

/// Target of this module's own diagnostics. [`TraceLayer`](super::layer::TraceLayer)
/// never routes these back into a sink.
pub(crate) const SINK_TARGET: &str = "action_trace::sink";

/// Something that accepts log records.
///
/// Implementations must tolerate concurrent callers: every active action scope
/// on every thread or task shares the same sink.
pub trait TraceSink: Send + Sync {
    /// Accept one record. Must not fail or block for long.
    fn log(&self, record: LogRecord);

    /// Whether a record of this severity would be kept
    fn enabled(&self, _severity: Severity) -> bool {
        true
    }

    fn flush(&self) {}
}

/// Appends one JSON line per record to a file or writer.
pub struct JsonlSink {
    path: Option<PathBuf>,
    min_severity: Severity,
    formatter: TraceFormatter,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it and its parent directory if needed
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        let mut sink = Self::from_writer(BufWriter::new(file));
        sink.path = Some(path.to_path_buf());
        Ok(sink)
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            path: None,
            min_severity: Severity::Trace,
            formatter: TraceFormatter::new(),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Flush and release the underlying writer
    pub fn close(self) -> io::Result<()> {
        self.writer.into_inner().flush()
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

impl TraceSink for JsonlSink {
    fn log(&self, record: LogRecord) {
        if !self.enabled(record.severity) {
            return;
        }
        let line = self.formatter.format(&record);
        if let Err(err) = self.write_line(&line) {
            tracing::debug!(
                target: SINK_TARGET,
                error = %err,
                path = ?self.path,
                "failed to append record to trace file"
            );
        }
    }

    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    fn flush(&self) {
        if let Err(err) = self.writer.lock().flush() {
            tracing::debug!(
                target: SINK_TARGET,
                error = %err,
                path = ?self.path,
                "failed to flush trace file"
            );
        }
    }
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink")
            .field("path", &self.path)
            .field("min_severity", &self.min_severity)
            .finish_non_exhaustive()
    }
}

/// Keeps records in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Records rendered the way a [`JsonlSink`] would write them
    pub fn lines(&self) -> Vec<String> {
        let formatter = TraceFormatter::new();
        self.records
            .lock()
            .iter()
            .map(|record| formatter.format(record))
            .collect()
    }
}

impl TraceSink for MemorySink {
    fn log(&self, record: LogRecord) {
        self.records.lock().push(record);
    }
}
