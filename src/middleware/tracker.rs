//! Observes whether a response has been committed, without changing it.

use crate::http::{Headers, ResponseWriter, StatusCode};

/// A pass-through [`ResponseWriter`] that remembers the first committed status.
///
/// Every call is forwarded to the wrapped sink exactly once and in order,
/// including repeated [`write_status`](ResponseWriter::write_status) calls:
/// deciding that a second status is a no-op is the wrapped sink's job. The
/// tracker only records what it saw.
///
/// # Examples
///
/// ```
/// use bulwark::http::{BufferedResponse, ResponseWriter, StatusCode};
/// use bulwark::middleware::ResponseTracker;
///
/// let mut res = BufferedResponse::new();
/// let mut tracked = ResponseTracker::new(&mut res);
/// assert!(!tracked.is_committed());
///
/// tracked.write(b"partial");
/// assert_eq!(tracked.committed_status(), Some(StatusCode::OK));
/// ```
pub struct ResponseTracker<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
}

impl<'a> ResponseTracker<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: None,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// The status the client will see, once something has been committed.
    pub fn committed_status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl ResponseWriter for ResponseTracker<'_> {
    fn headers(&self) -> &Headers {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
        self.inner.write_status(status);
    }

    fn write(&mut self, chunk: &[u8]) {
        self.status.get_or_insert(StatusCode::OK);
        self.inner.write(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call it receives, in order.
    #[derive(Default)]
    struct CallLog {
        headers: Headers,
        calls: Vec<String>,
    }

    impl ResponseWriter for CallLog {
        fn headers(&self) -> &Headers {
            &self.headers
        }

        fn headers_mut(&mut self) -> &mut Headers {
            self.calls.push("headers_mut".into());
            &mut self.headers
        }

        fn write_status(&mut self, status: StatusCode) {
            self.calls.push(format!("status {}", status.as_u16()));
        }

        fn write(&mut self, chunk: &[u8]) {
            self.calls.push(format!("write {}", chunk.len()));
        }
    }

    #[test]
    fn starts_uncommitted() {
        let mut log = CallLog::default();
        let tracked = ResponseTracker::new(&mut log);
        assert!(!tracked.is_committed());
        assert_eq!(tracked.committed_status(), None);
    }

    #[test]
    fn header_changes_do_not_commit() {
        let mut log = CallLog::default();
        let mut tracked = ResponseTracker::new(&mut log);
        tracked.headers_mut().set("X-Id", "7");
        assert!(!tracked.is_committed());
        assert_eq!(tracked.headers().get("x-id"), Some("7"));
    }

    #[test]
    fn first_status_is_remembered() {
        let mut log = CallLog::default();
        let mut tracked = ResponseTracker::new(&mut log);
        tracked.write_status(StatusCode::CREATED);
        tracked.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(tracked.committed_status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn body_write_without_status_records_ok() {
        let mut log = CallLog::default();
        let mut tracked = ResponseTracker::new(&mut log);
        tracked.write(b"abc");
        assert!(tracked.is_committed());
        assert_eq!(tracked.committed_status(), Some(StatusCode::OK));
    }

    #[test]
    fn forwards_every_call_unchanged_and_in_order() {
        let mut log = CallLog::default();
        {
            let mut tracked = ResponseTracker::new(&mut log);
            tracked.headers_mut().set("A", "1");
            tracked.write_status(StatusCode::ACCEPTED);
            tracked.write_status(StatusCode::ACCEPTED);
            tracked.write(b"hello");
            tracked.write(b"");
        }
        assert_eq!(
            log.calls,
            vec!["headers_mut", "status 202", "status 202", "write 5", "write 0"]
        );
        assert_eq!(log.headers.get("a"), Some("1"));
    }
}
