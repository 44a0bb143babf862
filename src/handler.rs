//! The handler capability and its type-erased form.
//!
//! A handler receives a borrowed [`Request`] and a borrowed
//! [`ResponseWriter`] and drives the response itself. Both borrows share the
//! lifetime of the returned future, which lets middleware allocate
//! per-request wrappers (a tracker, a recorder, a derived request) on their
//! own stack frame and lend them to the next handler:
//!
//! ```text
//! Recovery::call(req, res)
//!     let mut tracked = ResponseTracker::new(res);   ← lives in this future
//!     next.call(req, &mut tracked).await             ← lent for one call
//!     tracked.is_committed()                         ← read back afterwards
//! ```

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::{Request, ResponseWriter};

/// The future every handler returns.
pub type HandlerFuture<'a> = BoxFuture<'a, ()>;

/// A handler shared across concurrent requests.
///
/// `Arc` makes cloning the chain into each spawned connection task one
/// atomic increment.
pub type BoxedHandler = Arc<dyn Handler>;

/// Anything that can answer a request through a [`ResponseWriter`].
///
/// Middleware implement this for the handler they produce around `next`;
/// endpoints usually come from [`handler_fn`].
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a> {
        (**self).call(req, res)
    }
}

/// Wraps a closure as a [`Handler`].
///
/// The closure must return a boxed future borrowing its arguments; the
/// `.boxed()` adapter from [`futures_util::FutureExt`] produces exactly that.
///
/// # Examples
///
/// ```rust
/// use bulwark::handler_fn;
/// use bulwark::http::StatusCode;
/// use futures_util::FutureExt;
///
/// let hello = handler_fn(|_req, res| {
///     async move {
///         res.headers_mut().set("Content-Type", "text/plain");
///         res.write_status(StatusCode::OK);
///         res.write(b"hello");
///     }
///     .boxed()
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a Request, &'a mut dyn ResponseWriter) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    FnHandler(f)
}

/// A closure adapted by [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a Request, &'a mut dyn ResponseWriter) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a> {
        (self.0)(req, res)
    }
}
