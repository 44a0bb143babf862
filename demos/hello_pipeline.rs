//! Serves a small app behind the full middleware chain.
//!
//! ```text
//! cargo run --example hello_pipeline
//! curl -i  http://127.0.0.1:8080//hello//world     # 301 → /hello/world
//! curl -I  http://127.0.0.1:8080/hello/world       # HEAD from the GET handler
//! curl -i  http://127.0.0.1:8080/panic             # 500, details only in the log
//! ```

use bulwark::handler_fn;
use bulwark::http::{Method, StatusCode};
use bulwark::middleware::{Chain, HeadEmulator, Logger, PathNormalizer, Recovery};
use bulwark::server::Server;
use futures_util::FutureExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let app = Chain::new()
        .with(Recovery::new())
        .with(Logger)
        .with(PathNormalizer::new())
        .with(HeadEmulator::new())
        .then(handler_fn(|req, res| {
            async move {
                match (req.method(), req.path()) {
                    (Method::Get, "/panic") => panic!("demo panic"),
                    (Method::Get, path) => {
                        res.headers_mut().set("Content-Type", "text/plain; charset=utf-8");
                        res.write_status(StatusCode::OK);
                        res.write(format!("you asked for {path}\n").as_bytes());
                    }
                    _ => res.write_status(StatusCode::METHOD_NOT_ALLOWED),
                }
            }
            .boxed()
        }));

    let server = Server::bind("127.0.0.1:8080").await?;
    server.run(app).await?;
    Ok(())
}
