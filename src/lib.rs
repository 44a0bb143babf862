//! # bulwark
//!
//! Protocol-correctness middleware for async HTTP pipelines.
//!
//! Handlers drive a one-shot [`ResponseWriter`]: set headers, commit a
//! status once, stream the body. On top of that sink model bulwark provides
//! the components that are easy to get subtly wrong:
//!
//! - [`PathNormalizer`](middleware::PathNormalizer) — redirects `/users//1`
//!   to `/users/1`, keeping the query string byte for byte.
//! - [`HeadEmulator`](middleware::HeadEmulator) — answers `HEAD` from a `GET`
//!   handler without buffering the body it throws away.
//! - [`Recovery`](middleware::Recovery) — contains handler panics, answering
//!   `500` only when nothing has reached the client yet.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulwark::handler_fn;
//! use bulwark::http::StatusCode;
//! use bulwark::middleware::{Chain, HeadEmulator, Logger, PathNormalizer, Recovery};
//! use bulwark::server::Server;
//! use futures_util::FutureExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Chain::new()
//!         .with(Recovery::new())
//!         .with(Logger)
//!         .with(PathNormalizer::new())
//!         .with(HeadEmulator::new())
//!         .then(handler_fn(|_req, res| {
//!             async move {
//!                 res.headers_mut().set("Content-Type", "text/plain");
//!                 res.write_status(StatusCode::OK);
//!                 res.write(b"Hello, World!");
//!             }
//!             .boxed()
//!         }));
//!
//!     Server::bind("127.0.0.1:8080").await?.run(app).await?;
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod http;
pub mod middleware;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use handler::{BoxedHandler, Handler, handler_fn};
pub use http::{BufferedResponse, Headers, Method, Request, ResponseWriter, StatusCode};
pub use server::{Server, ServerError};
