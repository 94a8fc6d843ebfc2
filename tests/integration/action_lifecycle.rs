//! Integration tests for the action lifecycle
//!
//! Flow: ActionTracer -> JsonlSink -> trace file -> read_trace_file

use std::io;
use std::time::{Duration, Instant};

use action_trace::trace::{ActionEvent, Cancelled, TraceMessage};
use tokio_util::sync::CancellationToken;

use super::common::{by_trace_id, TraceFixture};

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("compile failed: {0}")]
struct CompileError(String);

/// Test the documented build scenario end to end
#[test]
fn test_build_scenario_enter_then_exit() {
    let fixture = TraceFixture::new();

    let started = Instant::now();
    let scope = fixture
        .tracer
        .begin("build", TraceMessage::new("compiling %s").arg("mod.x"))
        .expect("message renders");
    let result: Result<&str, CompileError> = scope.run(|| {
        std::thread::sleep(Duration::from_millis(15));
        Ok("mod.x.o")
    });
    let elapsed = started.elapsed().as_secs_f64();
    assert_eq!(result, Ok("mod.x.o"));

    let records = fixture.action_records();
    assert_eq!(records.len(), 2);
    let (enter, exit) = (&records[0], &records[1]);

    assert_eq!(enter.message, "Action: build - compiling mod.x (enter)");
    assert_eq!(exit.message, "Action: build - compiling mod.x (exit)");
    assert_eq!(enter.event, ActionEvent::Enter);
    assert_eq!(exit.event, ActionEvent::Exit);
    assert_eq!(enter.trace_id, exit.trace_id);
    assert_eq!(enter.level, "TRACE");

    assert!(enter.start_time.is_some());
    assert!(enter.duration.is_none());
    assert!(exit.start_time.is_none());
    let duration = exit.duration.expect("exit carries duration");
    assert!(duration >= 0.015, "duration {duration} shorter than the work");
    assert!(duration <= elapsed + 0.001, "duration {duration} exceeds {elapsed}");
}

/// Test that a failing scope writes an error record and returns the error as is
#[test]
fn test_failure_writes_error_record() {
    let fixture = TraceFixture::new();

    let result: Result<(), CompileError> = fixture
        .tracer
        .begin("build", "linking")
        .unwrap()
        .run(|| Err(CompileError("undefined symbol".to_string())));
    assert_eq!(result, Err(CompileError("undefined symbol".to_string())));

    let records = fixture.action_records();
    assert_eq!(records.len(), 2);
    let error = &records[1];
    assert_eq!(error.event, ActionEvent::Error);
    assert_eq!(error.error.as_deref(), Some("compile failed: undefined symbol"));
    assert_eq!(error.error_type.as_deref(), Some("CompileError"));
    assert!(error.stacktrace.as_deref().is_some_and(|s| !s.is_empty()));
    assert!(error.duration.is_some_and(|d| d >= 0.0));
    assert_eq!(error.message, "Action: build - linking (error)");
}

/// Test that absent fields never appear as nulls on disk
#[test]
fn test_absent_fields_are_omitted_on_disk() {
    let fixture = TraceFixture::new();
    let _: io::Result<()> = fixture.tracer.begin("fs", "stat").unwrap().run(|| Ok(()));

    let lines = fixture.lines();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert!(!line.contains("null"), "unexpected null in {line}");
        assert!(!line.contains("\"error\""), "unexpected error key in {line}");
    }
    assert!(!lines[0].contains("duration"));
    assert!(!lines[1].contains("start_time"));
}

/// Test that an interrupted io error is a cancel, not an error
#[test]
fn test_interrupt_is_cancel() {
    let fixture = TraceFixture::new();
    let result: io::Result<()> = fixture
        .tracer
        .begin("read", "stdin")
        .unwrap()
        .run(|| Err(io::Error::from(io::ErrorKind::Interrupted)));
    assert_eq!(result.unwrap_err().kind(), io::ErrorKind::Interrupted);

    let events: Vec<ActionEvent> = fixture.action_records().iter().map(|r| r.event).collect();
    assert_eq!(events, vec![ActionEvent::Enter, ActionEvent::Cancel]);
}

/// Test that a scope whose task is aborted records cancel
#[tokio::test]
async fn test_aborted_task_records_cancel() {
    let fixture = TraceFixture::new();
    // Without arguments the template is used verbatim
    let scope = fixture.tracer.begin("eval", "sample %d").unwrap();

    let task = tokio::spawn(scope.run_async(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<(), CompileError>(())
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;
    task.abort();
    let join = task.await;
    assert!(join.unwrap_err().is_cancelled());

    let records = fixture.action_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].message, "Action: eval - sample %d (enter)");
    assert_eq!(records[1].event, ActionEvent::Cancel);
    assert!(records[1].duration.is_some_and(|d| d >= 0.0));
    assert!(records[1].error.is_none());
}

/// Test that token cancellation is recorded and still visible to the caller
#[tokio::test]
async fn test_token_cancellation_reaches_caller() {
    let fixture = TraceFixture::new();
    let token = CancellationToken::new();

    let scope = fixture.tracer.begin("generate", "waiting on model").unwrap();
    let child = token.child_token();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result: anyhow::Result<()> = scope
        .run_until_cancelled(&child, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is::<Cancelled>());
    assert!(child.is_cancelled());

    let events: Vec<ActionEvent> = fixture.action_records().iter().map(|r| r.event).collect();
    assert_eq!(events, vec![ActionEvent::Enter, ActionEvent::Cancel]);
}

/// Test that two interleaved scopes pair up only by trace id
#[tokio::test]
async fn test_interleaved_scopes_pair_by_trace_id() {
    let fixture = TraceFixture::new();

    let first = fixture.tracer.begin("download", "dataset").unwrap();
    let second = fixture.tracer.begin("score", "sample 1").unwrap();

    let (a, b) = tokio::join!(
        first.run_async(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<(), CompileError>(())
        }),
        second.run_async(async { Err::<(), _>(CompileError("bad".to_string())) }),
    );
    assert!(a.is_ok());
    assert!(b.is_err());

    let records = fixture.action_records();
    assert_eq!(records.len(), 4);

    let groups = by_trace_id(&records);
    assert_eq!(groups.len(), 2);
    for (_, group) in &groups {
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].event, ActionEvent::Enter);
        assert!(group[1].event.is_terminal());
        assert_eq!(group[0].action, group[1].action);
    }

    let download = groups.iter().find(|(_, g)| g[0].action == "download").unwrap();
    assert_eq!(download.1[1].event, ActionEvent::Exit);
    let score = groups.iter().find(|(_, g)| g[0].action == "score").unwrap();
    assert_eq!(score.1[1].event, ActionEvent::Error);
}

/// Test many concurrent scopes on threads sharing one sink
#[test]
fn test_concurrent_scopes_on_threads() {
    let fixture = TraceFixture::new();

    std::thread::scope(|s| {
        for worker in 0..8 {
            let tracer = fixture.tracer.clone();
            s.spawn(move || {
                for item in 0..10 {
                    let scope = tracer
                        .begin(
                            "work",
                            TraceMessage::new("worker %(w)d item %(i)d")
                                .kwarg("w", worker)
                                .kwarg("i", item),
                        )
                        .unwrap();
                    let _: Result<(), CompileError> = scope.run(|| Ok(()));
                }
            });
        }
    });

    let records = fixture.action_records();
    assert_eq!(records.len(), 160);
    let groups = by_trace_id(&records);
    assert_eq!(groups.len(), 80);
    assert!(groups.iter().all(|(_, g)| {
        g.len() == 2 && g[0].event == ActionEvent::Enter && g[1].event == ActionEvent::Exit
    }));
}

/// Test that a bad template writes nothing and surfaces the render error
#[test]
fn test_render_failure_writes_nothing() {
    let fixture = TraceFixture::new();
    let err = fixture
        .tracer
        .begin("build", TraceMessage::new("%(target)s").kwarg("other", "x"))
        .unwrap_err();
    assert!(err.to_string().contains("target"));
    assert!(fixture.records().is_empty());
}
