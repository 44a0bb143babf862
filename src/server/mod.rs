//! Async TCP transport using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a
//! [`Handler`], usually a [`Chain`](crate::middleware::Chain). Supports
//! HTTP/1.1 persistent connections (keep-alive) out of the box.
//!
//! Every request gets its own [`BufferedResponse`]; nothing is shared
//! between requests except the handler itself.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::handler::{BoxedHandler, Handler};
use crate::http::{
    BufferedResponse, Method, ResponseWriter, StatusCode,
    request::{Request, RequestError},
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A minimal HTTP/1.1 server for a handler chain.
///
/// # Examples
///
/// ```rust,no_run
/// use bulwark::handler_fn;
/// use bulwark::http::StatusCode;
/// use bulwark::middleware::{Chain, Recovery};
/// use bulwark::server::Server;
/// use futures_util::FutureExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let app = Chain::new().with(Recovery::new()).then(handler_fn(|_req, res| {
///         async move { res.write(b"Hello!") }.boxed()
///     }));
///     Server::bind("127.0.0.1:8080").await?.run(app).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, serving each on its own Tokio task.
    ///
    /// A panic escaping `handler` ends that connection's task only. Compose
    /// [`Recovery`](crate::middleware::Recovery) outermost to answer such
    /// requests with a `500` instead.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, handler: BoxedHandler) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "bulwark listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Sends a transport-level error response and asks the caller to close.
async fn reject(stream: &mut TcpStream, status: StatusCode, body: &str) -> std::io::Result<()> {
    let mut response = BufferedResponse::new();
    response.set_keep_alive(false);
    response.write_status(status);
    response.write(body.as_bytes());
    stream.write_all(&response.into_bytes()).await
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, serving one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`. Requests already buffered (pipelined behind the
/// previous one) are served before the socket is read again.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: BoxedHandler,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            reject(&mut stream, StatusCode::PAYLOAD_TOO_LARGE, "Request entity too large").await?;
            break;
        }

        let parsed = if buf.is_empty() {
            Err(RequestError::Incomplete)
        } else {
            Request::parse(&buf)
        };

        let (request, body_offset) = match parsed {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                reject(&mut stream, StatusCode::BAD_REQUEST, "Bad Request").await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                debug!(peer = %peer_addr, "connection closed mid-body");
                break;
            }
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let mut response = BufferedResponse::new();
        handler.call(&request, &mut response).await;
        response.set_keep_alive(keep_alive);
        response.set_head_only(*request.method() == Method::Head);

        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}
