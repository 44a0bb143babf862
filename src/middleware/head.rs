//! Answers `HEAD` requests from `GET` handlers.

use std::sync::Arc;

use futures_util::FutureExt;
use tracing::debug;

use crate::handler::{BoxedHandler, Handler, HandlerFuture};
use crate::http::{Method, Request, ResponseWriter, StatusCode};
use crate::middleware::{Middleware, Recorder};

/// Middleware that lets a route registered only for `GET` answer `HEAD`.
///
/// A `HEAD` request is re-issued downstream as a derived `GET` copy (the
/// caller's request keeps its `HEAD` method) against a [`Recorder`] seeded
/// with the headers already on the real response. The resulting headers
/// and status are then installed on the real response, with no body, so a
/// handler that replaces or removes a header set by an outer link has the
/// same effect as it would on `GET`. When the handler wrote a body without
/// declaring its length, `Content-Length` is filled in from the number of
/// bytes it wrote.
///
/// Place this directly around the dispatcher. Panics raised by the `GET`
/// handler are not caught here; they unwind to the enclosing
/// [`Recovery`](crate::middleware::Recovery).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEmulator;

impl HeadEmulator {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for HeadEmulator {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(EmulateHead { next })
    }
}

struct EmulateHead {
    next: BoxedHandler,
}

impl Handler for EmulateHead {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a> {
        async move {
            if *req.method() != Method::Head {
                return self.next.call(req, res).await;
            }

            let as_get = req.with_method(Method::Get);
            let mut recorder = Recorder::with_headers(res.headers().clone());
            self.next.call(&as_get, &mut recorder).await;

            let status = recorder.status().unwrap_or(StatusCode::OK);
            let discarded = recorder.discarded_bytes();
            debug!(
                path = %req.path(),
                status = status.as_u16(),
                discarded,
                "answered HEAD from GET"
            );

            // The recorder started from the real headers, so its final map is
            // exactly what the GET handler would have left on the response.
            let mut headers = recorder.into_headers();
            if discarded > 0 && !headers.contains("content-length") {
                headers.set("Content-Length", discarded.to_string());
            }
            *res.headers_mut() = headers;
            res.write_status(status);
        }
        .boxed()
    }
}
