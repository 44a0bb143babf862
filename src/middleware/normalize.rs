//! Canonicalizes request paths that contain repeated separators.
//!
//! `/users//1` and `/users/1` name the same resource, but routers, caches
//! and access rules compare strings. The [`PathNormalizer`] redirects (or
//! internally rewrites) such requests to the cleaned form before anything
//! downstream sees them.

use futures_util::FutureExt;
use tracing::debug;

use crate::handler::{BoxedHandler, Handler, HandlerFuture};
use crate::http::{Request, ResponseWriter, StatusCode};
use crate::middleware::Middleware;

/// Lexically cleans a URL path.
///
/// Repeated `/` collapse to one, `.` segments are dropped, `..` removes the
/// preceding segment (and is ignored at the root), and the result always
/// starts with `/` and never ends with one unless it is the root itself.
///
/// # Examples
///
/// ```
/// use bulwark::middleware::clean_path;
///
/// assert_eq!(clean_path("//users////1"), "/users/1");
/// assert_eq!(clean_path("a/./b/../c/"), "/a/c");
/// assert_eq!(clean_path("/../.."), "/");
/// assert_eq!(clean_path(""), "/");
/// ```
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

/// What to do with a request whose path is not canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Redirect(StatusCode),
    Rewrite,
}

/// Middleware that canonicalizes paths containing `//`.
///
/// Paths without a doubled separator are never touched, so `/a/./b` passes
/// through as-is. For the rest the canonical form is [`clean_path`] of the
/// wire path, with a trailing `/` kept if the client sent one, followed by
/// the original query string byte for byte.
///
/// By default the client is sent a `301 Moved Permanently` with a
/// `Location` header and an empty body, and the downstream handler is not
/// invoked. Applying the normalizer to its own output never redirects
/// again.
///
/// # Examples
///
/// ```rust,no_run
/// use bulwark::http::StatusCode;
/// use bulwark::middleware::PathNormalizer;
///
/// // 308 keeps the method and body on redirect.
/// let strict = PathNormalizer::new().redirect_status(StatusCode::PERMANENT_REDIRECT);
///
/// // Serve the canonical path directly instead of bouncing the client.
/// let quiet = PathNormalizer::new().rewrite();
/// ```
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    action: Action,
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathNormalizer {
    /// Redirects non-canonical paths with `301 Moved Permanently`.
    pub fn new() -> Self {
        Self {
            action: Action::Redirect(StatusCode::MOVED_PERMANENTLY),
        }
    }

    /// Uses `status` for redirects instead of `301`.
    #[must_use]
    pub fn redirect_status(mut self, status: StatusCode) -> Self {
        self.action = Action::Redirect(status);
        self
    }

    /// Invokes downstream with a canonical copy of the request instead of
    /// redirecting.
    #[must_use]
    pub fn rewrite(mut self) -> Self {
        self.action = Action::Rewrite;
        self
    }
}

impl Middleware for PathNormalizer {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        std::sync::Arc::new(Normalized {
            action: self.action,
            next,
        })
    }
}

struct Normalized {
    action: Action,
    next: BoxedHandler,
}

/// Returns the canonical path for `original`, or `None` if it is already
/// canonical as far as this middleware is concerned.
fn canonical_path(original: &str) -> Option<String> {
    if !original.contains("//") {
        return None;
    }

    let mut canonical = clean_path(original);
    if original.len() > 1 && original.ends_with('/') && canonical != "/" {
        canonical.push('/');
    }
    Some(canonical)
}

fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_owned(),
    }
}

impl Handler for Normalized {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut dyn ResponseWriter) -> HandlerFuture<'a> {
        async move {
            let original = req.raw_path().unwrap_or(req.path());
            let Some(canonical) = canonical_path(original) else {
                return self.next.call(req, res).await;
            };

            let query = req.query_string();
            let target = with_query(&canonical, query);
            if target == with_query(original, query) {
                return self.next.call(req, res).await;
            }

            match self.action {
                Action::Redirect(status) => {
                    debug!(
                        from = %original,
                        to = %target,
                        status = status.as_u16(),
                        "redirecting to canonical path"
                    );
                    res.headers_mut().set("Location", target);
                    res.write_status(status);
                }
                Action::Rewrite => {
                    debug!(from = %original, to = %canonical, "rewriting to canonical path");
                    let rewritten = req.with_path(&canonical);
                    self.next.call(&rewritten, res).await;
                }
            }
        }
        .boxed()
    }
}
