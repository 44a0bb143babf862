//! Incoming request model and HTTP/1.1 parsing via [`httparse`].

use std::borrow::Cow;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP request as seen by handlers and middleware.
///
/// The path is available in two forms: [`path`](Self::path) is
/// percent-decoded, [`raw_path`](Self::raw_path) is the target exactly as it
/// arrived on the wire (when the transport kept it).
///
/// Middleware must treat a `Request` as read-only. When a component needs a
/// different view (another method, a canonical path) it derives a copy with
/// [`with_method`](Self::with_method) or [`with_path`](Self::with_path); the
/// body is reference-counted so the copy is shallow.
///
/// # Examples
///
/// ```
/// use bulwark::http::{Method, Request};
///
/// let req = Request::new(Method::Get, "/caf%C3%A9//menu?lang=fr");
/// assert_eq!(req.path(), "/café//menu");
/// assert_eq!(req.raw_path(), Some("/caf%C3%A9//menu"));
/// assert_eq!(req.query_string(), Some("lang=fr"));
///
/// let head = req.with_method(Method::Head);
/// assert_eq!(head.method(), &Method::Head);
/// assert_eq!(req.method(), &Method::Get);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    raw_path: Option<String>,
    query: Option<String>,
    host: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Builds an HTTP/1.1 request for `target` (path plus optional `?query`).
    ///
    /// The raw path is preserved as given; the decoded path falls back to the
    /// raw form when it does not decode to UTF-8. An absolute-form target
    /// such as `http://example.com/users/1` is split: the authority becomes
    /// the [`host`](Self::host) and only `/users/1` is kept as the path.
    pub fn new(method: impl Into<Method>, target: &str) -> Self {
        let (authority, rest) = split_authority(target);
        let (raw_path, query) = split_target(rest);
        let raw_path = match (authority, raw_path) {
            (Some(_), "") => "/",
            (_, path) => path,
        };
        Self {
            method: method.into(),
            path: decode_path(raw_path).into_owned(),
            raw_path: Some(raw_path.to_owned()),
            query: query.map(str::to_owned),
            host: authority.map(str::to_owned),
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Builds a request that only carries a decoded path, as produced by
    /// transports that do not keep the wire form.
    pub fn decoded(method: impl Into<Method>, path: impl Into<String>) -> Self {
        Self {
            raw_path: None,
            path: path.into(),
            ..Self::new(method, "")
        }
    }

    /// Adds a header. A `Host` header also sets [`host`](Self::host), unless
    /// the target was in absolute form, whose authority wins.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if name.eq_ignore_ascii_case("host") && self.host.is_none() {
            self.host = Some(value.clone());
        }
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(
            raw_req
                .method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );
        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut request = Self::new(method, target);
        request.version = version;
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                request = request.header(header.name, value);
            }
        }

        let content_length = request.content_length().unwrap_or(0);
        let body_end = buf.len().min(body_offset + content_length);
        request.body = Bytes::copy_from_slice(&buf[body_offset..body_end]);

        Ok((request, body_offset))
    }

    /// Returns a copy of this request with `method` replaced.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    /// Returns a copy of this request routed to `raw_path` instead.
    ///
    /// The query string is left untouched.
    pub fn with_path(&self, raw_path: &str) -> Self {
        Self {
            path: decode_path(raw_path).into_owned(),
            raw_path: Some(raw_path.to_owned()),
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the percent-decoded request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path as it arrived on the wire, if the transport kept it.
    pub fn raw_path(&self) -> Option<&str> {
        self.raw_path.as_deref()
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

/// Splits `scheme://authority` off an absolute-form target.
///
/// Returns the authority (empty authorities are treated as absent) and the
/// remainder starting at the path. Origin-form targets come back unchanged.
fn split_authority(target: &str) -> (Option<&str>, &str) {
    let Some((scheme, rest)) = target.split_once("://") else {
        return (None, target);
    };
    let mut chars = scheme.chars();
    let is_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !is_scheme {
        return (None, target);
    }
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, rest) = rest.split_at(end);
    ((!authority.is_empty()).then_some(authority), rest)
}

fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

fn decode_path(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.host(), Some("localhost"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn parse_keeps_raw_and_decoded_path() {
        let raw = b"GET /a%20b//c?x=%20 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/a b//c");
        assert_eq!(req.raw_path(), Some("/a%20b//c"));
        assert_eq!(req.query_string(), Some("x=%20"));
    }

    #[test]
    fn parse_reads_body_up_to_content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
        assert_eq!(req.body_bytes().as_ref(), b"hello");
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\nHost: a\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
        let (req, _) =
            Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn undecodable_path_falls_back_to_raw() {
        let req = Request::new(Method::Get, "/bad%FF");
        assert_eq!(req.path(), "/bad%FF");
    }

    #[test]
    fn derived_copies_leave_the_original_alone() {
        let original = Request::new(Method::Head, "/x//y?q=1")
            .header("Host", "example.com")
            .body("payload");

        let get = original.with_method(Method::Get);
        let moved = original.with_path("/x/y");

        assert_eq!(original.method(), &Method::Head);
        assert_eq!(original.raw_path(), Some("/x//y"));
        assert_eq!(get.method(), &Method::Get);
        assert_eq!(get.host(), Some("example.com"));
        assert_eq!(moved.path(), "/x/y");
        assert_eq!(moved.query_string(), Some("q=1"));
        assert_eq!(moved.body_bytes().as_ref(), b"payload");
    }

    #[test]
    fn absolute_form_target_moves_authority_to_host() {
        let raw = b"GET http://example.com:8080/users/1?page=2 HTTP/1.1\r\nHost: other\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/users/1");
        assert_eq!(req.raw_path(), Some("/users/1"));
        assert_eq!(req.query_string(), Some("page=2"));
        assert_eq!(req.host(), Some("example.com:8080"));
        assert_eq!(req.headers().get("host"), Some("other"));
    }

    #[test]
    fn absolute_form_without_path_is_root() {
        let req = Request::new(Method::Get, "https://example.com?x=1");
        assert_eq!(req.path(), "/");
        assert_eq!(req.query_string(), Some("x=1"));
        assert_eq!(req.host(), Some("example.com"));
    }

    #[test]
    fn scheme_like_text_inside_a_path_is_left_alone() {
        let req = Request::new(Method::Get, "/proxy/http://x");
        assert_eq!(req.path(), "/proxy/http://x");
        assert_eq!(req.host(), None);
    }

    #[test]
    fn decoded_only_request_has_no_raw_path() {
        let req = Request::decoded(Method::Get, "/users//1");
        assert_eq!(req.raw_path(), None);
        assert_eq!(req.path(), "/users//1");
        assert_eq!(req.query_string(), None);
    }
}
