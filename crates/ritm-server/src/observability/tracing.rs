//! OpenTelemetry tracing setup.
//!
//! Configures structured logging with:
//! - Environment-based filter
//! - Text or JSON console output
//! - OTLP/gRPC trace export through a batch span processor

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, Tracer, TracerProvider,
};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tonic::transport::ClientTlsConfig;
use tracing::Dispatch;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::TelemetryError;
use crate::config::{Config, LogFormat};

/// Spans buffered before new ones are dropped.
pub const MAX_QUEUE_SIZE: usize = 100;
/// Spans sent per export call.
pub const MAX_EXPORT_BATCH_SIZE: usize = 10;
/// Delay between two consecutive exports.
pub const SCHEDULED_DELAY: Duration = Duration::from_millis(500);
/// How long an export may run before it is abandoned.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

const _: () = assert!(MAX_EXPORT_BATCH_SIZE <= MAX_QUEUE_SIZE);

/// Name of the tracer handed to the `tracing` bridge.
pub const TRACER_NAME: &str = "ritm";

/// Configuration for the batch span processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Maximum number of spans waiting for export
    pub max_queue_size: usize,
    /// Maximum number of spans in a single export
    pub max_export_batch_size: usize,
    /// Maximum time between two exports
    pub scheduled_delay: Duration,
    /// Maximum duration of a single export
    pub export_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_queue_size: MAX_QUEUE_SIZE,
            max_export_batch_size: MAX_EXPORT_BATCH_SIZE,
            scheduled_delay: SCHEDULED_DELAY,
            export_timeout: EXPORT_TIMEOUT,
        }
    }
}

impl BatchSettings {
    /// Convert into the SDK batch configuration.
    pub fn to_batch_config(self) -> BatchConfig {
        BatchConfigBuilder::default()
            .with_max_queue_size(self.max_queue_size)
            .with_max_export_batch_size(self.max_export_batch_size)
            .with_scheduled_delay(self.scheduled_delay)
            .with_max_export_timeout(self.export_timeout)
            .build()
    }
}

/// Build the OTLP/gRPC span exporter for the given collector endpoint.
pub fn build_span_exporter(collector_url: &str) -> Result<SpanExporter, TelemetryError> {
    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(collector_url)
        .with_timeout(EXPORT_TIMEOUT);

    if collector_url.starts_with("https://") {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_native_roots());
    }

    builder
        .build()
        .map_err(|e| TelemetryError::TraceExporter(e.to_string()))
}

/// Build the tracer provider exporting through a batch span processor.
///
/// Must be called from within a tokio runtime; the processor spawns its
/// export loop on it.
pub fn build_tracer_provider(
    collector_url: &str,
    resource: Resource,
    settings: BatchSettings,
) -> Result<TracerProvider, TelemetryError> {
    let exporter = build_span_exporter(collector_url)?;

    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(settings.to_batch_config())
        .build();

    let provider = TracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource)
        .build();

    tracing::debug!(
        endpoint = collector_url,
        max_queue_size = settings.max_queue_size,
        max_export_batch_size = settings.max_export_batch_size,
        "OTLP trace exporter configured"
    );

    Ok(provider)
}

/// Tracer used by the `tracing` bridge.
pub fn tracer(provider: &TracerProvider) -> Tracer {
    provider.tracer(TRACER_NAME)
}

fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info,ritm=debug,ritm_server=debug"))
}

/// Console-only dispatcher for logs emitted before [`init_tracing`] runs.
///
/// The telemetry bootstrap has to finish before the global subscriber can
/// carry the OpenTelemetry layer, so its logs go through this one, installed
/// as the thread's default for the duration of the bootstrap.
pub fn startup_dispatch(config: &Config) -> Dispatch {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);

    match config.log_format {
        LogFormat::Text => Dispatch::new(builder.finish()),
        LogFormat::Json => Dispatch::new(builder.json().finish()),
    }
}

/// Initialize the global `tracing` subscriber.
///
/// This sets up:
/// - Console logging in the configured format
/// - Level filter from the configured log level (`RUST_LOG`)
/// - The OpenTelemetry bridge, when a tracer is given
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_tracing(config: &Config, tracer: Option<Tracer>) -> Result<(), TryInitError> {
    let filter = env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);
    let exporting = tracer.is_some();

    match config.log_format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            let otel_layer = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));
            registry.with(fmt_layer).with(otel_layer).try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true);
            let otel_layer = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));
            registry.with(fmt_layer).with(otel_layer).try_init()?;
        }
    }

    tracing::info!(
        environment = %config.environment,
        exporting,
        "Tracing initialized"
    );
    Ok(())
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
