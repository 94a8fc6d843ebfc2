//! Property tests for trace file round trips and formatter robustness

use action_trace::trace::{
    read_trace_file, write_trace_file, ActionEvent, ActionTraceRecord, FieldValue, LogRecord,
    Severity, SimpleTraceRecord, TraceFormatter, TraceRecord,
};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 _.:-]{0,24}",
        any::<String>().prop_map(|s| s.chars().take(24).collect()),
    ]
}

fn arb_extra() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec(
        (
            "x_[a-z]{1,8}",
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                arb_text().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                (-1.0e12f64..1.0e12).prop_map(Value::from),
            ],
        ),
        0..4,
    )
    .prop_map(|pairs| pairs.into_iter().collect())
}

fn arb_event() -> impl Strategy<Value = ActionEvent> {
    prop_oneof![
        Just(ActionEvent::Enter),
        Just(ActionEvent::Exit),
        Just(ActionEvent::Cancel),
        Just(ActionEvent::Error),
    ]
}

fn arb_simple() -> impl Strategy<Value = TraceRecord> {
    (
        "2025-0[1-9]-1[0-9]T0[0-9]:00:00\\.000000\\+00:00",
        prop_oneof![Just("INFO"), Just("WARNING"), Just("TRACE"), Just("DEBUG")],
        arb_text(),
        arb_extra(),
    )
        .prop_map(|(timestamp, level, message, extra)| {
            TraceRecord::Simple(SimpleTraceRecord {
                timestamp,
                level: level.to_string(),
                message,
                extra,
            })
        })
}

fn arb_action() -> impl Strategy<Value = TraceRecord> {
    (
        arb_text(),
        arb_event(),
        "[2-9A-Za-z]{22}",
        0.0f64..1.0e10,
        proptest::option::of(arb_text()),
    )
        .prop_map(|(action, event, trace_id, seconds, error)| {
            let is_error = event == ActionEvent::Error;
            TraceRecord::Action(ActionTraceRecord {
                timestamp: "2025-01-02T03:04:05.000000+00:00".to_string(),
                level: "TRACE".to_string(),
                message: format!("Action: {action} - work ({event})"),
                action,
                event,
                trace_id,
                start_time: (event == ActionEvent::Enter).then_some(seconds),
                duration: event.is_terminal().then_some(seconds),
                error: if is_error { error.clone() } else { None },
                error_type: is_error.then(|| "BuildError".to_string()),
                stacktrace: if is_error { error } else { None },
                extra: Map::new(),
            })
        })
}

fn arb_field_value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i64>().prop_map(FieldValue::Int),
        any::<u64>().prop_map(FieldValue::UInt),
        any::<f64>().prop_map(FieldValue::Float),
        any::<String>().prop_map(FieldValue::Str),
        any::<Vec<u8>>().prop_map(FieldValue::opaque),
    ]
}

proptest! {
    /// Writing N records and reading them back yields the same N records in order
    #[test]
    fn prop_trace_file_round_trip(
        records in prop::collection::vec(prop_oneof![arb_simple(), arb_action()], 0..24)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");

        write_trace_file(&path, &records).unwrap();
        let read_back = read_trace_file(&path).unwrap();

        prop_assert_eq!(read_back, records);
    }

    /// The formatter always produces one line of valid JSON, whatever the extras hold
    #[test]
    fn prop_formatter_never_fails(
        severity in prop::sample::select(Severity::ALL.to_vec()),
        message in any::<String>(),
        fields in prop::collection::vec(("[a-z_]{1,10}", arb_field_value()), 0..6),
    ) {
        let mut record = LogRecord::new(severity, message.clone());
        for (key, value) in fields {
            record = record.with_field(key, value);
        }

        let line = TraceFormatter::new().format(&record);
        prop_assert!(!line.contains('\n'));

        let parsed: Value = serde_json::from_str(&line).unwrap();
        let object = parsed.as_object().unwrap();
        prop_assert_eq!(object["message"].as_str(), Some(message.as_str()));
        prop_assert_eq!(object["level"].as_str(), Some(severity.as_str()));
        prop_assert!(object["timestamp"].is_string());
    }
}
