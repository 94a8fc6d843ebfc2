//! Typed trace records and the trace file reader.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::record::ActionEvent;

#[derive(Error, Debug)]
pub enum TraceFileError {
    #[error("failed to read trace file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid trace record at {}:{line}: {reason}\n  {content}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        content: String,
        reason: String,
    },
}

impl TraceFileError {
    fn io(path: &Path, source: io::Error) -> Self {
        TraceFileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// 1-based line number of a format error
    pub fn line(&self) -> Option<usize> {
        match self {
            TraceFileError::Format { line, .. } => Some(*line),
            TraceFileError::Io { .. } => None,
        }
    }
}

/// A general-purpose log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTraceRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    /// Any other keys on the line, in file order
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One lifecycle edge of a traced action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTraceRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub action: String,
    pub event: ActionEvent,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record read back from a trace file.
///
/// Lines with an `action` key are action records; all others are simple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceRecord {
    Simple(SimpleTraceRecord),
    Action(ActionTraceRecord),
}

impl TraceRecord {
    /// Decode one JSON object, choosing the shape by the presence of `action`
    pub fn from_json(object: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let is_action = object.contains_key("action");
        let value = Value::Object(object);
        if is_action {
            serde_json::from_value(value).map(TraceRecord::Action)
        } else {
            serde_json::from_value(value).map(TraceRecord::Simple)
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn timestamp(&self) -> &str {
        match self {
            TraceRecord::Simple(r) => &r.timestamp,
            TraceRecord::Action(r) => &r.timestamp,
        }
    }

    pub fn level(&self) -> &str {
        match self {
            TraceRecord::Simple(r) => &r.level,
            TraceRecord::Action(r) => &r.level,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TraceRecord::Simple(r) => &r.message,
            TraceRecord::Action(r) => &r.message,
        }
    }

    pub fn as_action(&self) -> Option<&ActionTraceRecord> {
        match self {
            TraceRecord::Action(r) => Some(r),
            TraceRecord::Simple(_) => None,
        }
    }
}

/// Read every record in a line-delimited JSON trace file, in file order.
///
/// Any undecodable line fails the whole read; there are no partial results.
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceRecord>, TraceFileError> {
    let file = File::open(path).map_err(|e| TraceFileError::io(path, e))?;
    read_trace_records(BufReader::new(file), path)
}

/// Read records from any buffered reader. `origin` names the source in errors.
pub fn read_trace_records<R: BufRead>(
    reader: R,
    origin: &Path,
) -> Result<Vec<TraceRecord>, TraceFileError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TraceFileError::io(origin, e))?;
        let format_error = |reason: String| TraceFileError::Format {
            path: origin.to_path_buf(),
            line: idx + 1,
            content: line.clone(),
            reason,
        };

        let object = match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(object)) => object,
            Ok(other) => {
                return Err(format_error(format!(
                    "expected a JSON object, found {}",
                    json_kind(&other)
                )))
            }
            Err(e) => return Err(format_error(e.to_string())),
        };
        let record = TraceRecord::from_json(object).map_err(|e| format_error(e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

/// Write records as line-delimited JSON, replacing `path`
pub fn write_trace_file(path: &Path, records: &[TraceRecord]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writeln!(
            writer,
            "{}",
            record.to_json_line().map_err(io::Error::other)?
        )?;
    }
    writer.flush()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
