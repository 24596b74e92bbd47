//! Configuration parsing for the ritm server.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides (the deployment sets `NODE_ENV`,
//!   `NEXT_RUNTIME` and the `NEXT_PUBLIC_*` variables)
//! - Sensible defaults for local runs

use clap::{Parser, ValueEnum};
use std::convert::Infallible;
use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Fallback used for the service name and version resource attributes.
pub const UNKNOWN: &str = "unknown";

/// Default OTLP/gRPC collector endpoint for trace export.
pub const DEFAULT_COLLECTOR_URL: &str = "https://otel.example.com:443";

/// Default port for Prometheus scraping.
pub const DEFAULT_METRICS_PORT: u16 = 9464;

/// Deployment environment.
///
/// Parsed leniently: only the exact value `production` enables telemetry
/// and the gate. Any value other than the three known ones is kept as
/// [`Environment::Other`] instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
    Other(String),
}

impl Environment {
    /// Map a raw `NODE_ENV` value; never fails.
    pub fn parse(value: &str) -> Result<Self, Infallible> {
        Ok(match value {
            "development" => Self::Development,
            "test" => Self::Test,
            "production" => Self::Production,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Test => f.write_str("test"),
            Self::Production => f.write_str("production"),
            Self::Other(value) => f.write_str(value),
        }
    }
}

/// Kind of runtime the process is hosted in.
///
/// Only the full server runtime carries the telemetry pipelines; a limited
/// (edge) deployment serves requests without them. `nodejs` and `server`
/// select the full runtime, `edge` the limited one, and any other value is
/// kept as [`RuntimeKind::Other`], which also runs without telemetry.
///
/// When `NEXT_RUNTIME` is unset the full server runtime is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKind {
    Server,
    Edge,
    Other(String),
}

impl RuntimeKind {
    /// Map a raw `NEXT_RUNTIME` value; never fails.
    pub fn parse(value: &str) -> Result<Self, Infallible> {
        Ok(match value {
            "nodejs" | "server" => Self::Server,
            "edge" => Self::Edge,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("nodejs"),
            Self::Edge => f.write_str("edge"),
            Self::Other(value) => f.write_str(value),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// ritm: web front server with OpenTelemetry bootstrap and health gate.
#[derive(Parser, Debug, Clone)]
#[command(name = "ritm")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "RITM_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to serve the application on
    #[arg(short, long, env = "RITM_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for Prometheus metrics scraping
    #[arg(long, env = "RITM_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Directory served under /_next/static
    #[arg(long, env = "RITM_STATIC_DIR", default_value = "./public")]
    pub static_dir: PathBuf,

    /// Deployment environment; telemetry and the health gate need production
    #[arg(
        long,
        env = "NODE_ENV",
        value_parser = Environment::parse,
        default_value_t = Environment::Development
    )]
    pub environment: Environment,

    /// Runtime kind; telemetry only starts on the full server runtime
    #[arg(
        long,
        env = "NEXT_RUNTIME",
        value_parser = RuntimeKind::parse,
        default_value_t = RuntimeKind::Server
    )]
    pub runtime: RuntimeKind,

    /// OTLP/gRPC collector endpoint for trace export
    #[arg(long, env = "OTEL_COLLECTOR_GRPC_URL", default_value = DEFAULT_COLLECTOR_URL)]
    pub collector_url: String,

    /// Client identifier, used as service name and host metrics name
    #[arg(long, env = "NEXT_PUBLIC_CLIENT")]
    pub client: Option<String>,

    /// Service version reported in resource attributes
    #[arg(long = "service-version", env = "NEXT_PUBLIC_VERSION")]
    pub service_version: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RITM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Interval between runtime scheduling-lag samples in milliseconds
    #[arg(long, env = "RITM_RUNTIME_SAMPLE_INTERVAL_MS", default_value_t = 1000)]
    pub runtime_sample_interval_ms: u64,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration for testing.
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            metrics_port: 0,
            log_level: "debug".into(),
            environment: Environment::Test,
            runtime_sample_interval_ms: 10,
            ..Self::default()
        }
    }

    /// Whether the process runs in production mode.
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether the telemetry bootstrap should run at all.
    pub fn telemetry_enabled(&self) -> bool {
        self.is_production() && self.runtime == RuntimeKind::Server
    }

    /// Service name resource attribute, `unknown` when unset or empty.
    pub fn client_name(&self) -> &str {
        non_empty_or_unknown(self.client.as_deref())
    }

    /// Service version resource attribute, `unknown` when unset or empty.
    pub fn service_version(&self) -> &str {
        non_empty_or_unknown(self.service_version.as_deref())
    }

    /// Name the host metrics collector registers under.
    pub fn host_metrics_name(&self) -> String {
        format!("{}-metrics", self.client_name())
    }

    /// Address the application listens on.
    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Address the Prometheus endpoint listens on.
    pub fn metrics_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.metrics_port).parse()
    }

    /// Interval of the runtime scheduling-lag sampler.
    pub fn runtime_sample_interval(&self) -> Duration {
        Duration::from_millis(self.runtime_sample_interval_ms.max(1))
    }
}

fn non_empty_or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => UNKNOWN,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            metrics_port: DEFAULT_METRICS_PORT,
            static_dir: PathBuf::from("./public"),
            environment: Environment::Development,
            runtime: RuntimeKind::Server,
            collector_url: DEFAULT_COLLECTOR_URL.into(),
            client: None,
            service_version: None,
            log_level: "info".into(),
            log_format: LogFormat::Text,
            runtime_sample_interval_ms: 1000,
        }
    }
}
