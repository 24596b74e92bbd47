//! HTTP server setup and lifecycle.
//!
//! Configures the axum application with:
//! - Application routes and static assets under `/_next/static`
//! - The request gate (health check, server-timing)
//! - Request spans and HTTP metrics when telemetry runs
//! - Graceful shutdown support

use axum::{
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::gate::{gate_middleware, Gate};
use crate::observability::http::{record_http_metrics, RecordStatus, RequestSpan};
use crate::observability::metrics::HttpMetrics;
use crate::observability::Telemetry;

/// Errors raised by the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address: {0}")]
    InvalidAddress(#[from] AddrParseError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

async fn index() -> Html<&'static str> {
    Html("<!doctype html><html><head><title>ritm</title></head><body><main>ritm</main></body></html>")
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Application routes, without the gate or instrumentation.
pub fn app_router(static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .nest_service("/_next/static", ServeDir::new(static_dir))
        .fallback(not_found)
}

/// Put the request gate in front of `router`.
pub fn with_gate(router: Router, gate: Gate) -> Router {
    router.layer(middleware::from_fn_with_state(gate, gate_middleware))
}

/// Wrap `router` in request spans and, when given, HTTP metrics.
///
/// The span layer is outermost so the gate sees the request span as current.
pub fn with_instrumentation(router: Router, http_metrics: Option<HttpMetrics>) -> Router {
    let router = match http_metrics {
        Some(metrics) => router.layer(middleware::from_fn_with_state(metrics, record_http_metrics)),
        None => router,
    };

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(RequestSpan)
            .on_response(RecordStatus),
    )
}

/// Build the complete application router.
pub fn build_router(config: &Config, telemetry: Option<&Telemetry>) -> Router {
    let router = with_gate(app_router(&config.static_dir), Gate::from_config(config));
    with_instrumentation(router, telemetry.map(Telemetry::http_metrics))
}

/// Serve `router` on an already bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // Wait for shutdown signal
            let _ = shutdown_rx.changed().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await
        .map_err(ServerError::Serve)
}

/// Run the ritm HTTP server.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `telemetry` - Running telemetry pipelines, if the bootstrap started them
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns when the server has shut down.
pub async fn run_server(
    config: &Config,
    telemetry: Option<&Telemetry>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let addr = config.listen_addr()?;
    let router = build_router(config, telemetry);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    tracing::info!(
        address = %addr,
        production = config.is_production(),
        static_dir = %config.static_dir.display(),
        "Starting ritm HTTP server"
    );

    serve(listener, router, shutdown_rx).await?;

    tracing::info!("Server stopped");
    Ok(())
}
