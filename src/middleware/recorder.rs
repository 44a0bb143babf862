//! An isolated sink that keeps headers and status but throws the body away.

use crate::http::{Headers, ResponseWriter, StatusCode};

/// A [`ResponseWriter`] whose output never reaches a client.
///
/// Headers and the first committed status are kept; body bytes are counted
/// and dropped, so memory use does not depend on how much the handler
/// writes.
#[derive(Debug, Default)]
pub struct Recorder {
    headers: Headers,
    status: Option<StatusCode>,
    discarded: u64,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from `headers`, so the handler sees what an outer link
    /// already set on the real response.
    pub fn with_headers(headers: Headers) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    /// The status the handler committed, if it committed one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Number of body bytes written and dropped.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    pub fn into_headers(self) -> Headers {
        self.headers
    }
}

impl ResponseWriter for Recorder {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    fn write(&mut self, chunk: &[u8]) {
        self.status.get_or_insert(StatusCode::OK);
        self.discarded += chunk.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_headers_and_first_status() {
        let mut rec = Recorder::new();
        rec.headers_mut().set("X-Version", "3");
        rec.write_status(StatusCode::CREATED);
        rec.write_status(StatusCode::OK);
        assert_eq!(rec.status(), Some(StatusCode::CREATED));
        assert_eq!(rec.headers().get("x-version"), Some("3"));
    }

    #[test]
    fn seeded_headers_can_be_replaced() {
        let mut seed = Headers::new();
        seed.set("Content-Type", "text/html");
        let mut rec = Recorder::with_headers(seed);
        rec.headers_mut().set("content-type", "application/json");
        assert_eq!(
            rec.into_headers().get_all("content-type").collect::<Vec<_>>(),
            vec!["application/json"]
        );
    }

    #[test]
    fn body_write_defaults_status_to_ok() {
        let mut rec = Recorder::new();
        rec.write(b"x");
        assert_eq!(rec.status(), Some(StatusCode::OK));
    }

    #[test]
    fn large_bodies_are_counted_not_kept() {
        let mut rec = Recorder::new();
        let chunk = vec![0u8; 64 * 1024];
        for _ in 0..256 {
            rec.write(&chunk);
        }
        assert_eq!(rec.discarded_bytes(), 16 * 1024 * 1024);
        assert!(std::mem::size_of::<Recorder>() < 128);
    }
}
