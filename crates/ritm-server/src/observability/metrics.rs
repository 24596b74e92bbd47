//! Prometheus-backed OpenTelemetry metrics.
//!
//! Key pieces:
//! - A pull exporter writing into a shared `prometheus::Registry`
//! - The meter provider bound to that exporter and the resolved resource
//! - Host metrics: process statistics registered under the client's name
//! - HTTP server instruments recorded by the request instrumentation

use opentelemetry::metrics::{Histogram, Meter, MeterProvider as _, UpDownCounter};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use prometheus::Registry;

use super::TelemetryError;

/// Instrumentation scope name for instruments created by this crate.
pub const METER_NAME: &str = "ritm";

/// Build the meter provider exporting into `registry`.
pub fn build_meter_provider(
    resource: Resource,
    registry: &Registry,
) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .map_err(|e| TelemetryError::MetricsExporter(e.to_string()))?;

    Ok(SdkMeterProvider::builder()
        .with_reader(exporter)
        .with_resource(resource)
        .build())
}

/// Meter used by the instrumentation in this crate.
pub fn meter(provider: &SdkMeterProvider) -> Meter {
    provider.meter(METER_NAME)
}

/// HTTP server instruments.
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    /// Duration of inbound requests in seconds.
    pub request_duration: Histogram<f64>,
    /// Requests currently being served.
    pub active_requests: UpDownCounter<i64>,
}

impl HttpMetrics {
    /// Create the HTTP instruments from a meter.
    pub fn new(meter: &Meter) -> Self {
        Self {
            request_duration: meter
                .f64_histogram("http.server.request.duration")
                .with_description("Duration of HTTP server requests")
                .with_unit("s")
                .build(),
            active_requests: meter
                .i64_up_down_counter("http.server.active_requests")
                .with_description("Number of active HTTP server requests")
                .with_unit("{request}")
                .build(),
        }
    }
}

/// Process and host resource utilization collector.
///
/// Registers process statistics (CPU time, resident memory, open file
/// descriptors, threads) into the shared registry. Values are sampled each
/// time the registry is scraped.
#[derive(Debug)]
pub struct HostMetrics {
    name: String,
    registry: Registry,
    started: bool,
}

impl HostMetrics {
    /// Create a collector with the given name; nothing is registered yet.
    pub fn new(name: impl Into<String>, registry: Registry) -> Self {
        Self {
            name: name.into(),
            registry,
            started: false,
        }
    }

    /// Collector name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric namespace derived from the collector name.
    pub fn namespace(&self) -> String {
        prometheus_namespace(&self.name)
    }

    /// Whether `start` has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Register the collectors. Calling it twice is a no-op.
    pub fn start(&mut self) -> Result<(), TelemetryError> {
        if self.started {
            return Ok(());
        }

        #[cfg(target_os = "linux")]
        {
            use prometheus::process_collector::ProcessCollector;

            let collector = ProcessCollector::new(std::process::id() as i32, self.namespace());
            self.registry
                .register(Box::new(collector))
                .map_err(|e| TelemetryError::HostMetrics(e.to_string()))?;
        }

        #[cfg(not(target_os = "linux"))]
        tracing::warn!(name = %self.name, "Process statistics are only collected on Linux");

        self.started = true;
        tracing::info!(name = %self.name, namespace = %self.namespace(), "Host metrics started");
        Ok(())
    }
}

/// Turn an arbitrary name into a valid Prometheus metric namespace.
pub fn prometheus_namespace(name: &str) -> String {
    let mut namespace: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if namespace.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        namespace.insert(0, '_');
    }
    namespace
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::KeyValue;

    #[test]
    fn test_prometheus_namespace() {
        assert_eq!(prometheus_namespace("unknown-metrics"), "unknown_metrics");
        assert_eq!(prometheus_namespace("acme.web-metrics"), "acme_web_metrics");
        assert_eq!(prometheus_namespace("9lives-metrics"), "_9lives_metrics");
        assert_eq!(prometheus_namespace(""), "_");
    }

    #[test]
    fn test_meter_provider_exports_into_registry() {
        let registry = Registry::new();
        let provider = build_meter_provider(Resource::empty(), &registry).unwrap();
        let meter = meter(&provider);

        let counter = meter.u64_counter("ritm_test_requests").build();
        counter.add(3, &[KeyValue::new("route", "/")]);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(
            names.iter().any(|n| n == "ritm_test_requests_total"),
            "counter missing from registry: {names:?}"
        );
    }

    #[test]
    fn test_http_metrics_record() {
        let registry = Registry::new();
        let provider = build_meter_provider(Resource::empty(), &registry).unwrap();
        let metrics = HttpMetrics::new(&meter(&provider));

        // Should not panic
        metrics.active_requests.add(1, &[]);
        metrics.request_duration.record(0.25, &[]);
        metrics.active_requests.add(-1, &[]);
    }

    #[test]
    fn test_host_metrics_start_is_idempotent() {
        let registry = Registry::new();
        let mut host = HostMetrics::new("unknown-metrics", registry);
        assert!(!host.is_started());

        host.start().unwrap();
        host.start().unwrap();
        assert!(host.is_started());
        assert_eq!(host.name(), "unknown-metrics");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_host_metrics_use_namespace() {
        let registry = Registry::new();
        let mut host = HostMetrics::new("acme-metrics", registry.clone());
        host.start().unwrap();

        let families = registry.gather();
        assert!(!families.is_empty());
        assert!(families
            .iter()
            .all(|family| family.get_name().starts_with("acme_metrics_process_")));
    }
}
