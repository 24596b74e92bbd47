//! Prometheus HTTP endpoint for metrics scraping.
//!
//! Provides `GET /metrics` in the Prometheus text exposition format. The
//! listener is bound during the telemetry bootstrap so a taken port fails
//! startup; serving happens on a background task.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::TelemetryError;

/// Prometheus server state.
#[derive(Clone)]
pub struct PrometheusState {
    registry: Arc<Registry>,
}

impl PrometheusState {
    /// Create a new Prometheus state with the given registry.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

/// Create the Prometheus HTTP router.
pub fn create_router(state: PrometheusState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Handle GET /metrics - Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<PrometheusState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string())],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

/// Bind the scrape listener.
pub async fn bind_metrics_listener(addr: SocketAddr) -> Result<TcpListener, TelemetryError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| TelemetryError::MetricsBind { addr, source })
}

/// Serve the registry on an already bound listener until shutdown.
pub fn spawn_prometheus_server(
    listener: TcpListener,
    registry: Registry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let app = create_router(PrometheusState::new(registry));

    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Starting Prometheus metrics server");
        }

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
                tracing::info!("Prometheus server shutting down");
            })
            .await;

        if let Err(e) = served {
            tracing::error!(error = %e, "Prometheus server error");
        }
    })
}
