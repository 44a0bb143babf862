//! Middleware pipeline — composable wrappers around a handler.
//!
//! A [`Middleware`] takes the downstream handler and returns a new handler
//! that adds behavior before and/or after calling it. A [`Chain`] composes
//! any number of them around an endpoint.
//!
//! ## Core types
//!
//! - [`Middleware`] — the chain-link trait: `wrap(next) -> handler`.
//! - [`Chain`] — ordered composition; the first link added runs first and
//!   finishes last.
//! - [`ResponseTracker`] — observes whether a response has been committed.
//! - [`Recorder`] — a sink that keeps headers and status and drops the body.
//!
//! ## Built-in middleware
//!
//! | Middleware         | Placement                          |
//! |--------------------|------------------------------------|
//! | [`Recovery`]       | outermost                          |
//! | [`Logger`]         | anywhere outside the HEAD emulator |
//! | [`PathNormalizer`] | before dispatch                    |
//! | [`HeadEmulator`]   | directly around the dispatcher     |
//!
//! Ordering is the caller's responsibility; a misordered chain is a
//! configuration error and is not detected at runtime.

use std::sync::Arc;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::handler::{BoxedHandler, Handler, HandlerFuture};
use crate::http::{Request, ResponseWriter};

mod head;
mod normalize;
mod recorder;
mod recover;
mod tracker;

pub use head::HeadEmulator;
pub use normalize::{PathNormalizer, clean_path};
pub use recorder::Recorder;
pub use recover::{FAILURE_BODY, JsonLinesSink, LogSink, PanicReport, Recovery, TracingSink};
pub use tracker::ResponseTracker;

/// A composable unit that wraps a downstream handler.
///
/// `wrap` is called once, when the chain is built; the handler it returns
/// is then shared by every request. Per-request state belongs inside the
/// returned handler's future, never in the middleware value.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use bulwark::handler::{BoxedHandler, Handler, HandlerFuture};
/// use bulwark::http::{Request, ResponseWriter};
/// use bulwark::middleware::Middleware;
/// use futures_util::FutureExt;
///
/// struct PoweredBy;
///
/// struct WithPoweredBy(BoxedHandler);
///
/// impl Handler for WithPoweredBy {
///     fn call<'a>(
///         &'a self,
///         req: &'a Request,
///         res: &'a mut dyn ResponseWriter,
///     ) -> HandlerFuture<'a> {
///         async move {
///             res.headers_mut().set("X-Powered-By", "bulwark");
///             self.0.call(req, res).await;
///         }
///         .boxed()
///     }
/// }
///
/// impl Middleware for PoweredBy {
///     fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
///         Arc::new(WithPoweredBy(next))
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// An ordered stack of [`Middleware`].
///
/// Links run in the order they were added: the first one sees the request
/// first and the response last.
///
/// # Examples
///
/// ```rust
/// use bulwark::handler_fn;
/// use bulwark::http::StatusCode;
/// use bulwark::middleware::{Chain, HeadEmulator, Logger, PathNormalizer, Recovery};
/// use futures_util::FutureExt;
///
/// let app = Chain::new()
///     .with(Recovery::new())
///     .with(Logger)
///     .with(PathNormalizer::new())
///     .with(HeadEmulator::new())
///     .then(handler_fn(|_req, res| async move { res.write_status(StatusCode::OK) }.boxed()));
/// # let _ = app;
/// ```
#[derive(Default, Clone)]
pub struct Chain {
    links: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `middleware` inside every link added before it.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.links.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Wraps `endpoint` in every link and returns the composed handler.
    pub fn then<H: Handler>(&self, endpoint: H) -> BoxedHandler {
        let endpoint: BoxedHandler = Arc::new(endpoint);
        self.links
            .iter()
            .rev()
            .fold(endpoint, |next, link| link.wrap(next))
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes,
/// in the format:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// The method logged is the one the client sent; a `HEAD` answered by the
/// [`HeadEmulator`] is logged as `HEAD`. A handler that never committed is
/// logged with status `-`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Logged { next })
    }
}

struct Logged {
    next: BoxedHandler,
}

impl Handler for Logged {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a> {
        async move {
            let start = Instant::now();
            let mut tracked = ResponseTracker::new(res);

            self.next.call(req, &mut tracked).await;

            let duration = start.elapsed();
            match tracked.committed_status() {
                Some(status) => tracing::info!(
                    "{} {} - {} ({:?})",
                    req.method(),
                    req.path(),
                    status.as_u16(),
                    duration
                ),
                None => tracing::info!("{} {} - - ({:?})", req.method(), req.path(), duration),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::handler_fn;
    use crate::http::{BufferedResponse, Method, StatusCode};

    /// Appends its name to a shared trace on the way in and on the way out.
    struct Mark {
        name: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    struct Marked {
        name: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
        next: BoxedHandler,
    }

    impl Middleware for Mark {
        fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
            Arc::new(Marked {
                name: self.name,
                trace: Arc::clone(&self.trace),
                next,
            })
        }
    }

    impl Handler for Marked {
        fn call<'a>(
            &'a self,
            req: &'a Request,
            res: &'a mut dyn ResponseWriter,
        ) -> HandlerFuture<'a> {
            async move {
                self.trace.lock().unwrap().push(format!("{} in", self.name));
                self.next.call(req, res).await;
                self.trace.lock().unwrap().push(format!("{} out", self.name));
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn first_link_runs_outermost() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mark = |name| Mark {
            name,
            trace: Arc::clone(&trace),
        };
        let endpoint_trace = Arc::clone(&trace);

        let chain = Chain::new().with(mark("a")).with(mark("b"));
        assert_eq!(chain.len(), 2);
        let app = chain.then(handler_fn(move |_req, res| {
            endpoint_trace.lock().unwrap().push("endpoint".into());
            async move { res.write_status(StatusCode::OK) }.boxed()
        }));

        app.call(&Request::new(Method::Get, "/"), &mut BufferedResponse::new())
            .await;

        assert_eq!(
            *trace.lock().unwrap(),
            vec!["a in", "b in", "endpoint", "b out", "a out"]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_the_endpoint() {
        let chain = Chain::new();
        assert!(chain.is_empty());
        let app = chain.then(handler_fn(|_req, res| {
            async move { res.write(b"direct") }.boxed()
        }));
        let mut res = BufferedResponse::new();
        app.call(&Request::new(Method::Get, "/"), &mut res).await;
        assert_eq!(res.body(), b"direct");
    }

    #[tokio::test]
    async fn logger_is_transparent() {
        let app = Chain::new().with(Logger).then(handler_fn(|_req, res| {
            async move {
                res.headers_mut().set("X-A", "1");
                res.write_status(StatusCode::CREATED);
                res.write(b"body");
            }
            .boxed()
        }));
        let mut res = BufferedResponse::new();
        app.call(&Request::new(Method::Post, "/things"), &mut res).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.sent_headers().get("x-a"), Some("1"));
        assert_eq!(res.body(), b"body");
    }
}
