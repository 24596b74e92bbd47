//! ritm: web front server with an OpenTelemetry bootstrap and a request gate.
//!
//! At startup the telemetry bootstrap wires tracing (OTLP/gRPC through a
//! batch span processor) and metrics (Prometheus pull endpoint, HTTP,
//! runtime and process instruments), but only in production on the full
//! server runtime. Every request then passes the gate, which answers
//! `/health` and stamps responses with a `server-timing` trace link.
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`gate`]: Health short-circuit and trace stamping middleware
//! - [`observability`]: Telemetry bootstrap, metrics and tracing setup
//! - [`server`]: HTTP server setup

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // gate::matcher::MatchRule is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod gate;
pub mod observability;
pub mod server;

pub use config::Config;
pub use gate::{Gate, HealthPayload, MatchRule};
pub use observability::{bootstrap, Telemetry, TelemetryError};
pub use server::{build_router, run_server, ServerError};
