//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - The telemetry bootstrap (`bootstrap`), run once at startup
//! - Structured tracing with OTLP export
//! - Prometheus-scraped metrics: HTTP, runtime and host/process
//! - W3C trace context propagation

pub mod http;
pub mod metrics;
pub mod prometheus;
pub mod resource;
pub mod runtime;
pub mod tracing;

use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use self::metrics::{HostMetrics, HttpMetrics};
use self::runtime::RuntimeMetrics;
use self::tracing::BatchSettings;

/// Errors raised while bootstrapping telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to build the OTLP span exporter.
    #[error("failed to build OTLP trace exporter: {0}")]
    TraceExporter(String),

    /// Failed to build the Prometheus metrics exporter.
    #[error("failed to build Prometheus metrics exporter: {0}")]
    MetricsExporter(String),

    /// Failed to register host metrics collectors.
    #[error("failed to start host metrics: {0}")]
    HostMetrics(String),

    /// The metrics address could not be parsed.
    #[error("invalid metrics address: {0}")]
    InvalidAddress(#[from] AddrParseError),

    /// The metrics port could not be bound.
    #[error("failed to bind metrics endpoint on {addr}: {source}")]
    MetricsBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Running telemetry pipelines.
///
/// Built once by [`bootstrap`] and handed to the server. The providers are
/// also installed as process globals for the `tracing` bridge and any
/// library instrumentation reading them.
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    registry: ::prometheus::Registry,
    host_metrics: HostMetrics,
    http_metrics: HttpMetrics,
    metrics_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

/// Start telemetry if the configuration calls for it.
///
/// Returns `Ok(None)` outside production or on the edge runtime; nothing is
/// constructed and no port is bound in that case. Any construction failure
/// is returned and should abort startup.
pub async fn bootstrap(
    config: &Config,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<Option<Telemetry>, TelemetryError> {
    if !config.telemetry_enabled() {
        ::tracing::debug!(
            environment = %config.environment,
            runtime = %config.runtime,
            "Telemetry disabled"
        );
        return Ok(None);
    }

    Telemetry::start(config, shutdown_rx).await.map(Some)
}

impl Telemetry {
    /// Build and install every pipeline, then start background collection.
    ///
    /// Must be called from within a multi-threaded tokio runtime.
    pub async fn start(
        config: &Config,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, TelemetryError> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = resource::resolve_resource(config);

        // Metrics pipeline: pull exporter, scrape endpoint, meter provider.
        let registry = ::prometheus::Registry::new();
        let meter_provider = metrics::build_meter_provider(resource.clone(), &registry)?;
        let configured_addr = config.metrics_addr()?;
        let listener = prometheus::bind_metrics_listener(configured_addr).await?;
        let metrics_addr = listener.local_addr().unwrap_or(configured_addr);
        let mut host_metrics = HostMetrics::new(config.host_metrics_name(), registry.clone());

        // Tracing pipeline: OTLP exporter behind the batch processor.
        let tracer_provider = tracing::build_tracer_provider(
            &config.collector_url,
            resource,
            BatchSettings::default(),
        )?;

        // Instrumentation.
        let meter = metrics::meter(&meter_provider);
        let http_metrics = HttpMetrics::new(&meter);
        let runtime_metrics = RuntimeMetrics::new(&meter, tokio::runtime::Handle::current());

        global::set_meter_provider(meter_provider.clone());
        global::set_tracer_provider(tracer_provider.clone());

        host_metrics.start()?;
        let tasks = vec![
            prometheus::spawn_prometheus_server(listener, registry.clone(), shutdown_rx.clone()),
            runtime_metrics.spawn_lag_sampler(config.runtime_sample_interval(), shutdown_rx),
        ];

        ::tracing::info!(
            collector = %config.collector_url,
            metrics_addr = %metrics_addr,
            service = config.client_name(),
            version = config.service_version(),
            "Telemetry started"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
            registry,
            host_metrics,
            http_metrics,
            metrics_addr,
            tasks,
        })
    }

    /// Tracer for the `tracing` bridge.
    pub fn tracer(&self) -> Tracer {
        tracing::tracer(&self.tracer_provider)
    }

    /// HTTP server instruments.
    pub fn http_metrics(&self) -> HttpMetrics {
        self.http_metrics.clone()
    }

    /// Registry behind the scrape endpoint.
    pub fn registry(&self) -> &::prometheus::Registry {
        &self.registry
    }

    /// Host metrics collector.
    pub fn host_metrics(&self) -> &HostMetrics {
        &self.host_metrics
    }

    /// Address the scrape endpoint is bound to.
    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    /// Wait for background tasks, then flush and shut down the providers.
    ///
    /// The shutdown signal the pipelines were started with must have fired.
    pub async fn shutdown(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                ::tracing::warn!(error = %e, "Telemetry task failed");
            }
        }

        let tracer_provider = self.tracer_provider;
        let meter_provider = self.meter_provider;
        let flushed = tokio::task::spawn_blocking(move || {
            if let Err(e) = tracer_provider.shutdown() {
                ::tracing::warn!(error = %e, "Failed to shut down tracer provider");
            }
            if let Err(e) = meter_provider.shutdown() {
                ::tracing::warn!(error = %e, "Failed to shut down meter provider");
            }
        })
        .await;

        if let Err(e) = flushed {
            ::tracing::warn!(error = %e, "Telemetry shutdown task failed");
        }
        ::tracing::info!("Telemetry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, RuntimeKind};

    #[tokio::test]
    async fn test_bootstrap_disabled_outside_production() {
        let (_tx, rx) = watch::channel(false);
        let config = Config::test_config();

        let telemetry = bootstrap(&config, rx).await.unwrap();
        assert!(telemetry.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_disabled_on_edge_runtime() {
        let (_tx, rx) = watch::channel(false);
        let config = Config {
            environment: Environment::Production,
            runtime: RuntimeKind::Edge,
            ..Config::test_config()
        };

        let telemetry = bootstrap(&config, rx).await.unwrap();
        assert!(telemetry.is_none());
    }

    #[tokio::test]
    async fn test_disabled_bootstrap_binds_nothing() {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let (_tx, rx) = watch::channel(false);
        let config = Config {
            metrics_port: port,
            ..Config::test_config()
        };
        assert!(bootstrap(&config, rx).await.unwrap().is_none());

        // The port is still free.
        std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    }
}
