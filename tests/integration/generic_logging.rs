//! Integration tests for generic log records sharing a trace file with actions
//!
//! Flow: tracing events / LogRecords -> TraceLayer / JsonlSink -> trace file

use std::sync::Arc;

use action_trace::trace::{
    trace_message, FieldValue, LogRecord, Severity, TraceLayer, TraceMessage, TraceRecord,
    TraceSink,
};
use serde_json::Value;
use tracing_subscriber::prelude::*;

use super::common::TraceFixture;

/// Test that application tracing events and action records interleave in one file
#[test]
fn test_tracing_events_and_actions_share_file() {
    let fixture = TraceFixture::new();
    let subscriber = tracing_subscriber::registry().with(TraceLayer::new(fixture.sink.clone()));

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(task = "mmlu", "starting evaluation");
        let scope = fixture.tracer.begin("eval", "mmlu").unwrap();
        let _: Result<(), std::io::Error> = scope.run(|| {
            tracing::warn!(retries = 2u64, "rate limited");
            Ok(())
        });
    });

    let records = fixture.records();
    let shapes: Vec<&str> = records
        .iter()
        .map(|r| match r {
            TraceRecord::Simple(_) => "simple",
            TraceRecord::Action(_) => "action",
        })
        .collect();
    assert_eq!(shapes, vec!["simple", "action", "simple", "action"]);

    let TraceRecord::Simple(start) = &records[0] else {
        panic!("expected simple record");
    };
    assert_eq!(start.level, "INFO");
    assert_eq!(start.message, "starting evaluation");
    assert_eq!(start.extra["task"], "mmlu");
    assert!(start.extra["module"].as_str().is_some());
    assert!(start.extra["line"].as_u64().is_some());
    assert!(!start.extra.contains_key("function"));

    let TraceRecord::Simple(warn) = &records[2] else {
        panic!("expected simple record");
    };
    assert_eq!(warn.level, "WARNING");
    assert_eq!(warn.extra["retries"], 2);
}

/// Test that a value with no JSON form is written as text and the line stays valid
#[test]
fn test_unserializable_extra_is_written_as_text() {
    #[derive(Debug)]
    #[allow(dead_code)]
    struct ConnectionPool {
        size: usize,
    }

    let fixture = TraceFixture::new();
    fixture.sink.log(
        LogRecord::new(Severity::Error, TraceMessage::new("pool exhausted after %d waits").arg(5))
            .with_module("pool")
            .with_function("acquire")
            .with_line(88)
            .with_field("pool", FieldValue::opaque(ConnectionPool { size: 4 }))
            .with_field("load", f64::INFINITY),
    );

    let lines = fixture.lines();
    assert_eq!(lines.len(), 1);
    let parsed: Value = serde_json::from_str(&lines[0]).expect("valid JSON");
    assert_eq!(parsed["message"], "pool exhausted after 5 waits");
    assert_eq!(parsed["pool"], "ConnectionPool { size: 4 }");
    assert_eq!(parsed["load"], "inf");
    assert_eq!(parsed["function"], "acquire");
    assert_eq!(parsed["line"], 88);

    let records = fixture.records();
    assert!(matches!(records[0], TraceRecord::Simple(_)));
}

/// Test that trace messages are TRACE-level simple records
#[test]
fn test_trace_message_is_simple_trace_record() {
    let fixture = TraceFixture::new();
    let sink: Arc<dyn TraceSink> = fixture.sink.clone();
    trace_message(
        sink.as_ref(),
        "subprocess",
        TraceMessage::new("%s exited with %d").arg("docker").arg(0),
    );

    let records = fixture.records();
    assert_eq!(records.len(), 1);
    let TraceRecord::Simple(record) = &records[0] else {
        panic!("expected simple record");
    };
    assert_eq!(record.level, "TRACE");
    assert_eq!(record.message, "[subprocess] docker exited with 0");
    assert!(record.extra.is_empty());
}
