//! The response sink handed to handlers, and the transport's buffering sink.
//!
//! Handlers do not return a response value. They receive a
//! [`ResponseWriter`] and drive it: set headers, commit a status once, then
//! stream body bytes. Commitment is irrevocable, which is what the recovery
//! guard and the HEAD emulator have to reason about.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// A one-shot response sink for a single request.
///
/// # Contract
///
/// - Headers may be changed at any time through
///   [`headers_mut`](Self::headers_mut), but only the headers present when the
///   response is committed are guaranteed to reach the client.
/// - [`write_status`](Self::write_status) commits the response. The first call
///   wins; later calls are no-ops as far as the client is concerned.
/// - [`write`](Self::write) on an uncommitted response commits
///   [`StatusCode::OK`] first.
///
/// `Send` is a supertrait so `&mut dyn ResponseWriter` can be held across
/// `.await` points in multi-threaded runtimes.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &Headers;

    fn headers_mut(&mut self) -> &mut Headers;

    /// Commits `status` unless a status has already been committed.
    fn write_status(&mut self, status: StatusCode);

    /// Appends body bytes, committing `200 OK` first if nothing is committed.
    fn write(&mut self, chunk: &[u8]);
}

/// A [`ResponseWriter`] that buffers the whole response in memory.
///
/// This is the sink the [`Server`](crate::server::Server) allocates for every
/// request; it is also the natural sink for tests. The headers are
/// snapshotted at commit time, so header changes made afterwards are kept in
/// [`headers`](ResponseWriter::headers) but never serialized.
///
/// # Examples
///
/// ```
/// use bulwark::http::{BufferedResponse, ResponseWriter, StatusCode};
///
/// let mut res = BufferedResponse::new();
/// res.headers_mut().set("Content-Type", "application/json");
/// res.write(br#"{"status":"ok"}"#);
/// res.write_status(StatusCode::CREATED); // too late, already committed
///
/// assert_eq!(res.status(), StatusCode::OK);
/// let text = String::from_utf8(res.into_bytes().to_vec()).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct BufferedResponse {
    headers: Headers,
    sent: Option<(StatusCode, Headers)>,
    body: BytesMut,
    keep_alive: bool,
    head_only: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            headers: Headers::new(),
            sent: None,
            body: BytesMut::new(),
            keep_alive: true,
            head_only: false,
        }
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// Serialize headers only, as required when answering a `HEAD` request.
    pub fn set_head_only(&mut self, head_only: bool) {
        self.head_only = head_only;
    }

    pub fn is_committed(&self) -> bool {
        self.sent.is_some()
    }

    /// The committed status, or `200 OK` if the handler never committed one.
    pub fn status(&self) -> StatusCode {
        self.sent.as_ref().map_or(StatusCode::OK, |(status, _)| *status)
    }

    /// The headers that will go out on the wire.
    pub fn sent_headers(&self) -> &Headers {
        self.sent.as_ref().map_or(&self.headers, |(_, headers)| headers)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// An explicit `Content-Length` header set by the handler is respected
    /// (HEAD responses advertise the length of the body they omit); otherwise
    /// the buffered body length is written.
    pub fn into_bytes(self) -> BytesMut {
        let status = self.status();
        let mut headers = match self.sent {
            Some((_, headers)) => headers,
            None => self.headers,
        };

        // A declared length only describes a body that is not sent (HEAD);
        // otherwise the bytes actually written decide.
        let actual = self.body.len().to_string();
        let content_length = match headers.get("content-length") {
            Some(declared) if self.head_only || declared.trim() == actual => {
                declared.trim().to_owned()
            }
            _ => actual,
        };
        headers.remove("content-length");

        if !self.body.is_empty() && !headers.contains("content-type") {
            headers.set("Content-Type", "text/plain; charset=utf-8");
        }
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        headers.set("Connection", connection);

        let body_len = if self.head_only { 0 } else { self.body.len() };
        let mut buf = BytesMut::with_capacity(128 + headers.len() * 64 + body_len);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                status.as_u16(),
                status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);

        if !self.head_only {
            buf.put(self.body.freeze());
        }
        buf
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.sent.is_none() {
            self.sent = Some((status, self.headers.clone()));
        }
    }

    fn write(&mut self, chunk: &[u8]) {
        self.write_status(StatusCode::OK);
        self.body.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn first_status_wins() {
        let mut res = BufferedResponse::new();
        res.write_status(StatusCode::CREATED);
        res.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[test]
    fn write_commits_ok_implicitly() {
        let mut res = BufferedResponse::new();
        assert!(!res.is_committed());
        res.write(b"Hello");
        assert!(res.is_committed());
        let s = to_string(res.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn headers_after_commit_are_not_sent() {
        let mut res = BufferedResponse::new();
        res.headers_mut().set("X-Early", "1");
        res.write_status(StatusCode::NO_CONTENT);
        res.headers_mut().set("X-Late", "1");

        assert!(res.headers().contains("x-late"));
        assert!(!res.sent_headers().contains("x-late"));
        let s = to_string(res.into_bytes());
        assert!(s.contains("X-Early: 1\r\n"));
        assert!(!s.contains("X-Late"));
    }

    #[test]
    fn uncommitted_response_serializes_as_empty_ok() {
        let s = to_string(BufferedResponse::new().into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 0\r\n"));
        assert!(!s.contains("Content-Type"));
    }

    #[test]
    fn head_only_keeps_declared_length_and_drops_body() {
        let mut res = BufferedResponse::new();
        res.headers_mut().set("Content-Length", "42");
        res.write_status(StatusCode::OK);
        res.set_head_only(true);
        let s = to_string(res.into_bytes());
        assert!(s.contains("Content-Length: 42\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn mismatched_declared_length_yields_to_the_body() {
        let mut res = BufferedResponse::new();
        res.headers_mut().set("Content-Length", "1000");
        res.write(b"short");
        let s = to_string(res.into_bytes());
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(!s.contains("1000"));
        assert!(s.ends_with("\r\n\r\nshort"));
    }

    #[test]
    fn matching_declared_length_is_sent_once() {
        let mut res = BufferedResponse::new();
        res.headers_mut().set("Content-Length", "5");
        res.write(b"exact");
        let s = to_string(res.into_bytes());
        assert_eq!(s.matches("Content-Length").count(), 1);
        assert!(s.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn connection_close() {
        let mut res = BufferedResponse::new();
        res.set_keep_alive(false);
        let s = to_string(res.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }
}
