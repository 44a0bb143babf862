//! Panic containment for everything downstream.
//!
//! A handler that panics must not take its connection task down with a
//! half-written response, and must not leak internals to the client. The
//! [`Recovery`] middleware catches the unwind, reports it to a [`LogSink`],
//! and answers `500 Internal Server Error` if, and only if, nothing has been
//! committed yet.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Once};

use futures_util::FutureExt;
use serde::Serialize;
use tracing::{error, warn};

use crate::handler::{BoxedHandler, Handler, HandlerFuture};
use crate::http::{Request, ResponseWriter, StatusCode};
use crate::middleware::{Middleware, ResponseTracker};

/// Body written for recovered panics. Never contains diagnostic detail.
pub const FAILURE_BODY: &[u8] = b"Internal Server Error\n";

/// A recovered panic, as handed to a [`LogSink`].
#[derive(Debug, Clone, Serialize)]
pub struct PanicReport {
    /// The panic payload, when it was a string.
    pub message: String,
    pub method: String,
    pub path: String,
    /// Status already sent to the client, if the panic came after commit.
    pub committed_status: Option<u16>,
    pub backtrace: String,
}

thread_local! {
    /// Stack captured by the panic hook, before unwinding starts.
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Installs, once per process, a panic hook that records the panicking
/// thread's stack and then defers to whatever hook was there before.
fn install_trace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture();
            // try_with: the hook can run while thread-locals are being torn down.
            let _ = PANIC_TRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Takes the stack recorded for the most recent panic on this thread.
///
/// Falls back to the current stack if no hook-captured trace is available,
/// for example when another hook replaced ours after installation.
fn take_panic_trace() -> Backtrace {
    PANIC_TRACE
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
        .unwrap_or_else(Backtrace::force_capture)
}

impl PanicReport {
    fn new(
        payload: &(dyn Any + Send),
        req: &Request,
        committed: Option<StatusCode>,
        backtrace: Backtrace,
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_owned()
        };

        Self {
            message,
            method: req.method().to_string(),
            path: req.path().to_owned(),
            committed_status: committed.map(StatusCode::as_u16),
            backtrace: backtrace.to_string(),
        }
    }
}

/// Destination for [`PanicReport`]s.
///
/// Implementations should return quickly; they run on the request's task
/// before the failure response is written.
pub trait LogSink: Send + Sync {
    fn record(&self, report: &PanicReport);
}

/// Emits each report as a `tracing` error event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, report: &PanicReport) {
        error!(
            method = %report.method,
            path = %report.path,
            committed_status = ?report.committed_status,
            backtrace = %report.backtrace,
            "handler panicked: {}",
            report.message
        );
    }
}

/// Writes each report as one line of JSON to `W`.
///
/// Write failures are ignored: losing a diagnostic line is preferable to
/// failing the recovery path.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use bulwark::middleware::{JsonLinesSink, Recovery};
///
/// let recovery = Recovery::with_sink(Arc::new(JsonLinesSink::new(std::io::stderr())));
/// ```
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> LogSink for JsonLinesSink<W> {
    fn record(&self, report: &PanicReport) {
        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if serde_json::to_writer(&mut *writer, report).is_ok() {
            let _ = writer.write_all(b"\n");
            let _ = writer.flush();
        }
    }
}

/// Middleware that turns downstream panics into a safe response.
///
/// Must be the outermost link of the chain so it sees panics from every
/// other link.
///
/// # Behavior
///
/// - No panic: the response passes through untouched.
/// - Panic before anything was committed: the report goes to the sink, then
///   the client gets `500` with body `Internal Server Error\n`.
/// - Panic after commit: the report goes to the sink and the response is
///   left as it is. Writing a second status would be lost at best and
///   corrupt the stream at worst.
///
/// # Examples
///
/// ```rust,no_run
/// use bulwark::middleware::{Chain, Recovery};
///
/// let chain = Chain::new().with(Recovery::new());
/// ```
#[derive(Clone)]
pub struct Recovery {
    sink: Arc<dyn LogSink>,
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Recovery {
    /// Reports panics through [`TracingSink`].
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Reports panics through `sink`.
    ///
    /// Also installs a process-wide panic hook that records the stack at the
    /// panic site. The hook chains to the previously installed one, so the
    /// default panic message is still printed.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        install_trace_hook();
        Self { sink }
    }
}

impl Middleware for Recovery {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Recover {
            sink: Arc::clone(&self.sink),
            next,
        })
    }
}

struct Recover {
    sink: Arc<dyn LogSink>,
    next: BoxedHandler,
}

impl Handler for Recover {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a> {
        async move {
            let mut tracked = ResponseTracker::new(res);
            let outcome = AssertUnwindSafe(self.next.call(req, &mut tracked))
                .catch_unwind()
                .await;
            let Err(payload) = outcome else {
                return;
            };

            let trace = take_panic_trace();
            let committed = tracked.committed_status();
            let report = PanicReport::new(&*payload, req, committed, trace);
            // A sink that panics must not escape the recovery path.
            if catch_unwind(AssertUnwindSafe(|| self.sink.record(&report))).is_err() {
                warn!(path = %report.path, "panic log sink panicked; report dropped");
            }

            if let Some(status) = committed {
                warn!(
                    method = %report.method,
                    path = %report.path,
                    status = status.as_u16(),
                    "response already committed; failure response dropped"
                );
                return;
            }

            let headers = tracked.headers_mut();
            headers.set("Content-Type", "text/plain; charset=utf-8");
            headers.set("X-Content-Type-Options", "nosniff");
            tracked.write_status(StatusCode::INTERNAL_SERVER_ERROR);
            tracked.write(FAILURE_BODY);
        }
        .boxed()
    }
}
