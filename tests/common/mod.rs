//! Shared test utilities for action-trace
//!
//! Provides a scratch trace file wired to a [`JsonlSink`] and an
//! [`ActionTracer`], plus helpers for pulling records back out.

use std::path::PathBuf;
use std::sync::Arc;

use action_trace::trace::{
    read_trace_file, ActionTraceRecord, ActionTracer, JsonlSink, TraceRecord, TraceSink,
};
use tempfile::TempDir;

/// A temporary trace file with a tracer writing to it
pub struct TraceFixture {
    _dir: TempDir,
    pub path: PathBuf,
    pub sink: Arc<JsonlSink>,
    pub tracer: ActionTracer,
}

impl TraceFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("trace-test.log");
        let sink = Arc::new(JsonlSink::create(&path).expect("create trace file"));
        let tracer = ActionTracer::new(sink.clone());
        Self {
            _dir: dir,
            path,
            sink,
            tracer,
        }
    }

    /// Flush and read every record back from disk
    pub fn records(&self) -> Vec<TraceRecord> {
        self.sink.flush();
        read_trace_file(&self.path).expect("read trace file")
    }

    /// Only the action records, in file order
    pub fn action_records(&self) -> Vec<ActionTraceRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TraceRecord::Action(a) => Some(a),
                TraceRecord::Simple(_) => None,
            })
            .collect()
    }

    /// Raw lines of the trace file
    pub fn lines(&self) -> Vec<String> {
        self.sink.flush();
        std::fs::read_to_string(&self.path)
            .expect("read trace file")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Group action records by trace id, preserving first-seen order
pub fn by_trace_id(records: &[ActionTraceRecord]) -> Vec<(String, Vec<ActionTraceRecord>)> {
    let mut groups: Vec<(String, Vec<ActionTraceRecord>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(id, _)| *id == record.trace_id) {
            Some((_, group)) => group.push(record.clone()),
            None => groups.push((record.trace_id.clone(), vec![record.clone()])),
        }
    }
    groups
}
