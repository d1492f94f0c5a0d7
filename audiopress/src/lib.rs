//! # audiopress: upload-and-shrink service for transcription pipelines
//!
//! `audiopress` is a small HTTP service with a single job: take an uploaded media file, squeeze its
//! audio down to a 64 kbps MP3 with an external encoder (ffmpeg), and hand the result back. It
//! exists to keep recordings under the upload size limits of speech-to-text APIs.
//!
//! ## Request Flow
//!
//! A client posts a multipart form to `/compress` with the media in a part named `file`. Bodies
//! above the configured limit are turned away with 413 before the handler runs. The handler then:
//!
//! 1. assigns the request a fresh id and derives two paths in the temp directory from it
//!    ([`staging::JobFiles`]),
//! 2. streams the upload to the input path,
//! 3. runs the encoder with a fixed argument list under a wall-clock timeout ([`encoder::Encoder`]),
//! 4. streams the MP3 back as `compressed_audio.mp3`.
//!
//! Both temp files are removed before the handler returns, whatever the outcome. Failures come
//! back as JSON `{"error": ...}` bodies: 400 for a missing or unnamed file, 500 with the encoder's
//! stderr in `details` when it exits non-zero, 504 when it times out, and a generic 500 for
//! anything else (see [`errors`]).
//!
//! Requests are independent. There is no queue and no shared mutable state; concurrent requests
//! each get their own pair of temp files and their own encoder process.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use audiopress::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = audiopress::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     audiopress::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod config;
pub mod encoder;
pub mod errors;
mod openapi;
pub mod staging;
pub mod telemetry;

#[cfg(all(test, unix))]
pub mod test_utils;

use crate::encoder::Encoder;
use crate::openapi::ApiDoc;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::{
    Json, Router,
    routing::{get, post},
};
pub use config::Config;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;

/// Application state shared across all request handlers.
///
/// Read-only after construction; every request works on its own temp files and encoder process.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub encoder: Encoder,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            encoder: Encoder::new(&config.encoder),
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
///
/// The upload route swaps axum's default 2 MB extractor limit for a [`RequestBodyLimitLayer`] sized
/// from `max_upload_size`, which answers 413 from the declared `Content-Length` alone and caps
/// bodies that arrive without one.
pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes();

    Router::new()
        .route(
            "/compress",
            post(api::handlers::compress::compress_audio)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload)),
        )
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Prepare the shared temp directory and, if configured, make sure the encoder can be run.
async fn prepare_environment(config: &Config, encoder: &Encoder) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .with_context(|| format!("Failed to create temp directory {}", config.temp_dir.display()))?;
    debug!("Using temp directory {}", config.temp_dir.display());

    if config.encoder.verify_on_startup {
        let version = encoder
            .probe()
            .await
            .with_context(|| format!("Encoder {} is not usable", encoder.program().display()))?;
        info!(program = %encoder.program().display(), %version, "Encoder available");
    }

    Ok(())
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] creates the temp directory, probes the encoder and builds
///    the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown future resolves, in-flight requests finish and telemetry
///    is flushed
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting audiopress with configuration: {:#?}", config);

        let state = AppState::new(config.clone());
        prepare_environment(&config, &state.encoder).await?;

        Ok(Self {
            router: build_router(state),
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "audiopress listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
