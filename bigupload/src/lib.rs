//! # bigupload: HTTP upload ingest benchmarking server
//!
//! `bigupload` benchmarks and compares strategies for ingesting large file
//! uploads over HTTP without excessive memory or disk overhead. It exposes
//! three upload endpoints, each exercising a different data path:
//!
//! - `POST /request-files` - multipart form-field parsing, drained to a
//!   discard sink. This mirrors clients restricted to form-data uploads.
//! - `POST /request-stream` - the raw request body consumed directly as a
//!   stream and persisted to a uniquely named file. This is the path that
//!   achieves bounded memory use at the framework boundary.
//! - `POST /stream-pass-to-next` - the raw request body relayed byte-for-byte
//!   to a downstream instance of the same service, preserving streaming
//!   semantics across the hop.
//!
//! The invariant across all three: at no point does any component hold the
//! whole upload in memory. Data flows chunk-by-chunk from the inbound
//! connection to the sink ([`sink`]) or the outbound connection ([`relay`]).
//!
//! Each endpoint accepts a `profile` query flag that wraps the handler in a
//! wall-time and memory measurement and writes a report keyed by the request's
//! content type and declared size ([`profiling`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use bigupload::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = bigupload::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     bigupload::telemetry::init_telemetry()?;
//!
//!     Application::new(config).serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await
//! }
//! ```
//!
//! The companion `uploader` crate drives uploads against this server from the
//! command line.

pub mod api;
pub mod config;
pub mod errors;
pub mod profiling;
pub mod relay;
pub mod sink;
pub mod telemetry;

pub use config::Config;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

/// Boxed error type used at the stream seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application state shared across all request handlers.
///
/// Holds the immutable configuration resolved at startup and the shared HTTP
/// client used for relaying streams downstream (connection pooling lives in
/// the client, so it is created once).
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_upload_size = state.config.max_upload_size;

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/request-files",
            post(api::handlers::uploads::upload_request_files),
        )
        .route(
            "/request-stream",
            post(api::handlers::uploads::upload_request_stream),
        )
        .route(
            "/stream-pass-to-next",
            post(api::handlers::uploads::stream_pass_to_next),
        )
        .layer(DefaultBodyLimit::max(max_upload_size))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct that owns the router and lifecycle.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance from resolved configuration.
    pub fn new(config: Config) -> Self {
        let state = AppState {
            config: config.clone(),
            http_client: reqwest::Client::new(),
        };
        let router = build_router(state);
        Self { router, config }
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving on the configured bind address with graceful shutdown.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "upload benchmark server listening on http://{}, relaying to {} by default",
            bind_addr, self.config.default_next
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("server stopped");
        Ok(())
    }

    /// Serve on an already-bound listener. Used when chaining instances, e.g.
    /// booting the downstream hop of a relay on an ephemeral port.
    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
