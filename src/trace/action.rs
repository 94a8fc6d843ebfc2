//! Scoped action tracing.
//!
//! An action scope emits an `enter` record when it begins and exactly one
//! terminal record (`exit`, `cancel`, or `error`) when it ends:
//!
//! ```ignore
//! let tracer = ActionTracer::new(sink);
//! let scope = tracer.begin("build", TraceMessage::new("compiling %s").arg("mod.x"))?;
//! let output = scope.run(|| compile("mod.x"))?;
//! ```
//!
//! The work's own result is handed back untouched. Panics are recorded and
//! resumed. A scope whose future is dropped before completing records `cancel`.

use std::any::{type_name, Any, TypeId};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::id::new_trace_id;
use super::level::{ParseSeverityError, Severity};
use super::message::{RenderError, TraceMessage};
use super::record::{ActionEvent, ActionFields, LogRecord};
use super::sink::TraceSink;

/// Cooperative cancellation signal.
///
/// Returning this (directly, inside `anyhow::Error`, or as the source of
/// another error) from traced work records the action as cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("action cancelled")]
pub struct Cancelled;

/// Details of a failed action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Unqualified type name of the error, or `panic`
    pub kind: String,
    pub message: String,
    pub trace: String,
}

impl Failure {
    /// Describe a failed result's error.
    ///
    /// Errors erased into `anyhow::Error` or a boxed `dyn Error` are named by
    /// the first link of their source chain that is a known kind (see
    /// [`register_error_kind`]).
    pub fn from_error<E: Any + Display + Debug>(err: &E) -> Self {
        let any: &dyn Any = err;
        let (kind, chain) = if let Some(e) = any.downcast_ref::<anyhow::Error>() {
            // anyhow's Debug output already lists the cause chain
            let kind = erased_kind(&**e).unwrap_or_else(|| "anyhow::Error".to_string());
            (kind, None)
        } else if let Some(e) = boxed_error(any) {
            let kind = erased_kind(e).unwrap_or_else(|| "Box<dyn Error>".to_string());
            (kind, Some(e))
        } else {
            (short_type_name(type_name::<E>()), known_error(any))
        };
        let message = err.to_string();
        let trace = render_trace(&kind, &message, &format!("{err:?}"), chain);
        Self {
            kind,
            message,
            trace,
        }
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());
        let trace = render_trace("panic", &message, "", None);
        Self {
            kind: "panic".to_string(),
            message,
            trace,
        }
    }

    fn unwinding() -> Self {
        let message = "scope dropped while unwinding".to_string();
        let trace = render_trace("panic", &message, "", None);
        Self {
            kind: "panic".to_string(),
            message,
            trace,
        }
    }
}

/// How an action ended. Decided once per activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Cancelled,
    Failed(Failure),
}

impl ActionOutcome {
    pub fn classify<T, E>(result: &Result<T, E>) -> Self
    where
        E: Any + Display + Debug,
    {
        match result {
            Ok(_) => ActionOutcome::Completed,
            Err(err) => Self::classify_error(err),
        }
    }

    pub fn classify_error<E>(err: &E) -> Self
    where
        E: Any + Display + Debug,
    {
        if is_cancellation(err) {
            ActionOutcome::Cancelled
        } else {
            ActionOutcome::Failed(Failure::from_error(err))
        }
    }

    pub fn event(&self) -> ActionEvent {
        match self {
            ActionOutcome::Completed => ActionEvent::Exit,
            ActionOutcome::Cancelled => ActionEvent::Cancel,
            ActionOutcome::Failed(_) => ActionEvent::Error,
        }
    }
}

/// Whether `err` is, or wraps, a cancellation or interrupt.
fn is_cancellation(err: &dyn Any) -> bool {
    if err.is::<Cancelled>() {
        return true;
    }
    if let Some(e) = err.downcast_ref::<io::Error>() {
        return chain_is_cancellation(e);
    }
    if let Some(e) = err.downcast_ref::<tokio::task::JoinError>() {
        return e.is_cancelled();
    }
    if let Some(e) = err.downcast_ref::<anyhow::Error>() {
        return e.chain().any(is_cancel_link);
    }
    if let Some(e) = err.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
        return chain_is_cancellation(e.as_ref());
    }
    if let Some(e) = err.downcast_ref::<Box<dyn StdError>>() {
        return chain_is_cancellation(e.as_ref());
    }
    false
}

fn chain_is_cancellation(err: &(dyn StdError + 'static)) -> bool {
    error_chain(err).any(is_cancel_link)
}

fn is_cancel_link(err: &(dyn StdError + 'static)) -> bool {
    err.is::<Cancelled>()
        || err
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::Interrupted)
        || err
            .downcast_ref::<tokio::task::JoinError>()
            .is_some_and(|e| e.is_cancelled())
}

/// An error type that can be recognised behind `dyn Error`
struct ErrorKind {
    type_id: TypeId,
    name: String,
    matches: fn(&(dyn StdError + 'static)) -> bool,
    cast: fn(&dyn Any) -> Option<&(dyn StdError + 'static)>,
}

impl ErrorKind {
    fn of<E: StdError + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: short_type_name(type_name::<E>()),
            matches: is_kind::<E>,
            cast: cast_kind::<E>,
        }
    }
}

fn is_kind<E: StdError + 'static>(err: &(dyn StdError + 'static)) -> bool {
    err.is::<E>()
}

fn cast_kind<E: StdError + 'static>(value: &dyn Any) -> Option<&(dyn StdError + 'static)> {
    value
        .downcast_ref::<E>()
        .map(|e| e as &(dyn StdError + 'static))
}

fn error_kinds() -> &'static RwLock<Vec<ErrorKind>> {
    static KINDS: OnceLock<RwLock<Vec<ErrorKind>>> = OnceLock::new();
    KINDS.get_or_init(|| {
        RwLock::new(vec![
            ErrorKind::of::<io::Error>(),
            ErrorKind::of::<tokio::task::JoinError>(),
            ErrorKind::of::<serde_json::Error>(),
            ErrorKind::of::<fmt::Error>(),
            ErrorKind::of::<std::num::ParseIntError>(),
            ErrorKind::of::<std::num::ParseFloatError>(),
            ErrorKind::of::<std::str::Utf8Error>(),
            ErrorKind::of::<std::string::FromUtf8Error>(),
            ErrorKind::of::<RenderError>(),
            ErrorKind::of::<ParseSeverityError>(),
            ErrorKind::of::<Cancelled>(),
        ])
    })
}

/// Make `E` nameable when it reaches a scope inside `anyhow::Error` or a
/// boxed `dyn Error`, and let its `source()` chain be written into the
/// stack trace. Registering the same type twice is a no-op.
pub fn register_error_kind<E: StdError + 'static>() {
    let type_id = TypeId::of::<E>();
    let mut kinds = error_kinds().write();
    if kinds.iter().any(|k| k.type_id == type_id) {
        return;
    }
    kinds.push(ErrorKind::of::<E>());
}

/// Name of the first link in `err`'s source chain with a known kind
fn erased_kind(err: &(dyn StdError + 'static)) -> Option<String> {
    let kinds = error_kinds().read();
    error_chain(err).find_map(|link| {
        kinds
            .iter()
            .find(|k| (k.matches)(link))
            .map(|k| k.name.clone())
    })
}

/// `value` as a `dyn Error` when its concrete type is a known kind
fn known_error(value: &dyn Any) -> Option<&(dyn StdError + 'static)> {
    let cast = error_kinds()
        .read()
        .iter()
        .find(|k| k.type_id == value.type_id())
        .map(|k| k.cast)?;
    cast(value)
}

fn boxed_error(value: &dyn Any) -> Option<&(dyn StdError + 'static)> {
    if let Some(e) = value.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
        return Some(&**e as &(dyn StdError + 'static));
    }
    value
        .downcast_ref::<Box<dyn StdError>>()
        .map(|e| &**e as &(dyn StdError + 'static))
}

fn error_chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| (*e).source())
}

/// `std::io::error::Error` -> `io::Error`, `my_crate::BuildError<T>` -> `BuildError`
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    let segments: Vec<&str> = base.split("::").filter(|s| !s.is_empty()).collect();
    let Some((last, modules)) = segments.split_last() else {
        return full.to_string();
    };
    if *last == "Error" {
        if let Some(module) = modules.iter().rev().find(|m| **m != "error") {
            return format!("{module}::{last}");
        }
    }
    last.to_string()
}

fn render_trace(
    kind: &str,
    message: &str,
    debug: &str,
    chain: Option<&(dyn StdError + 'static)>,
) -> String {
    let mut trace = format!("{kind}: {message}");
    if !debug.is_empty() && debug != message {
        trace.push('\n');
        trace.push_str(debug);
    }
    if let Some(err) = chain {
        for cause in error_chain(err).skip(1) {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
        }
    }
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        trace.push_str("\n\nstack backtrace:\n");
        trace.push_str(&backtrace.to_string());
    }
    trace
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Opens action scopes against a shared sink.
#[derive(Clone)]
pub struct ActionTracer {
    sink: Arc<dyn TraceSink>,
}

impl ActionTracer {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn TraceSink> {
        &self.sink
    }

    /// Render the message and emit `enter`.
    ///
    /// If the message cannot be rendered nothing is emitted and the render
    /// error is returned.
    pub fn begin(
        &self,
        action: impl Into<String>,
        message: impl Into<TraceMessage>,
    ) -> Result<ActionScope, RenderError> {
        let message = message.into().render()?;
        Ok(ActionScope::enter(self.sink.clone(), action.into(), message))
    }

    /// Emit a free-form `TRACE` record tagged with `category`
    pub fn trace_message(&self, category: &str, message: impl Into<TraceMessage>) {
        trace_message(self.sink.as_ref(), category, message);
    }
}

impl Debug for ActionTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTracer").finish_non_exhaustive()
    }
}

/// Emit `[category] message` at `TRACE` severity.
///
/// The message is rendered by the formatter, not here.
pub fn trace_message(sink: &dyn TraceSink, category: &str, message: impl Into<TraceMessage>) {
    let message = message.into();
    let category = if message.args().is_empty() {
        category.to_string()
    } else {
        category.replace('%', "%%")
    };
    let mut record = LogRecord::new(Severity::Trace, message);
    record.template = format!("[{category}] {}", record.template);
    sink.log(record);
}

/// One activation of a traced action.
///
/// Exactly one terminal record is emitted, by `finish` or one of the runners,
/// or by `Drop` when the scope is abandoned (`cancel`, or `error` while
/// unwinding).
#[must_use = "dropping an action scope records it as cancelled"]
pub struct ActionScope {
    sink: Arc<dyn TraceSink>,
    action: String,
    message: String,
    trace_id: String,
    started: Instant,
    finished: bool,
}

impl ActionScope {
    fn enter(sink: Arc<dyn TraceSink>, action: String, message: String) -> Self {
        let scope = Self {
            sink,
            action,
            message,
            trace_id: new_trace_id(),
            started: Instant::now(),
            finished: false,
        };
        scope.emit(
            ActionEvent::Enter,
            ActionFields {
                action: scope.action.clone(),
                event: ActionEvent::Enter,
                trace_id: scope.trace_id.clone(),
                start_time: Some(epoch_seconds()),
                duration: None,
                error: None,
                error_type: None,
                stacktrace: None,
            },
        );
        scope
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// The rendered message, without the action annotation
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(mut self, outcome: ActionOutcome) {
        self.terminate(outcome);
    }

    pub fn exit(self) {
        self.finish(ActionOutcome::Completed);
    }

    pub fn cancel(self) {
        self.finish(ActionOutcome::Cancelled);
    }

    pub fn fail<E: Any + Display + Debug>(self, err: &E) {
        self.finish(ActionOutcome::Failed(Failure::from_error(err)));
    }

    /// Run blocking work inside the scope.
    pub fn run<T, E, F>(mut self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Any + Display + Debug,
    {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => {
                self.terminate(ActionOutcome::classify(&result));
                result
            }
            Err(payload) => {
                self.terminate(ActionOutcome::Failed(Failure::from_panic(&*payload)));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run a future inside the scope.
    ///
    /// Dropping the returned future before it completes (task abort, a losing
    /// `select!` branch, a timeout) records `cancel`.
    pub async fn run_async<T, E, Fut>(mut self, work: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Any + Display + Debug,
    {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => {
                self.terminate(ActionOutcome::classify(&result));
                result
            }
            Err(payload) => {
                self.terminate(ActionOutcome::Failed(Failure::from_panic(&*payload)));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Like [`run_async`](Self::run_async), but stop as soon as `token` fires.
    ///
    /// The token is left cancelled so the caller still observes the signal.
    pub async fn run_until_cancelled<T, E, Fut>(
        mut self,
        token: &CancellationToken,
        work: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Any + Display + Debug + From<Cancelled>,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.terminate(ActionOutcome::Cancelled);
                Err(Cancelled.into())
            }
            outcome = AssertUnwindSafe(work).catch_unwind() => match outcome {
                Ok(result) => {
                    self.terminate(ActionOutcome::classify(&result));
                    result
                }
                Err(payload) => {
                    self.terminate(ActionOutcome::Failed(Failure::from_panic(&*payload)));
                    panic::resume_unwind(payload)
                }
            }
        }
    }

    fn terminate(&mut self, outcome: ActionOutcome) {
        if self.finished {
            return;
        }
        self.finished = true;

        let duration = Some(self.started.elapsed().as_secs_f64());
        let event = outcome.event();
        let (error, error_type, stacktrace) = match outcome {
            ActionOutcome::Failed(failure) => (
                Some(failure.message),
                Some(failure.kind),
                Some(failure.trace),
            ),
            _ => (None, None, None),
        };
        self.emit(
            event,
            ActionFields {
                action: self.action.clone(),
                event,
                trace_id: self.trace_id.clone(),
                start_time: None,
                duration,
                error,
                error_type,
                stacktrace,
            },
        );
    }

    fn emit(&self, event: ActionEvent, fields: ActionFields) {
        let message = format!("Action: {} - {} ({})", self.action, self.message, event);
        self.sink.log(LogRecord::action(message, fields));
    }
}

impl Drop for ActionScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let outcome = if std::thread::panicking() {
            ActionOutcome::Failed(Failure::unwinding())
        } else {
            ActionOutcome::Cancelled
        };
        self.terminate(outcome);
    }
}

impl Debug for ActionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionScope")
            .field("action", &self.action)
            .field("trace_id", &self.trace_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
