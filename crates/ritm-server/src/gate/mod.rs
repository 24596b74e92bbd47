//! Per-request gate in front of the application.
//!
//! In production, for every request in scope:
//! - `/health` is answered immediately with the instance payload
//! - any other request is forwarded and the response is stamped with a
//!   `server-timing` header linking it to the active trace
//!
//! Outside production the gate forwards everything untouched.

pub mod matcher;

pub use matcher::{HeaderCondition, MatchRule};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::config::Config;

/// Path answered by the health short-circuit.
pub const HEALTH_PATH: &str = "/health";
/// Instance name reported by the health payload.
pub const INSTANCE_NAME: &str = "repro-require-in-the-middle";
/// Instance version reported by the health payload.
pub const INSTANCE_VERSION: &str = "0.1.0";

/// Response header carrying the trace linkage.
pub const SERVER_TIMING: &str = "server-timing";

/// Body of the health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPayload {
    pub instance: String,
    pub version: String,
}

impl Default for HealthPayload {
    fn default() -> Self {
        Self {
            instance: INSTANCE_NAME.to_string(),
            version: INSTANCE_VERSION.to_string(),
        }
    }
}

/// Gate state shared by all requests.
#[derive(Debug, Clone)]
pub struct Gate {
    production: bool,
    rule: Arc<MatchRule>,
    health: Arc<HealthPayload>,
}

impl Gate {
    /// Create a gate with the default scope rule and health payload.
    pub fn new(production: bool) -> Self {
        Self {
            production,
            rule: Arc::new(MatchRule::default()),
            health: Arc::new(HealthPayload::default()),
        }
    }

    /// Create a gate for the configured environment.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.is_production())
    }

    /// Replace the scope rule.
    pub fn with_rule(mut self, rule: MatchRule) -> Self {
        self.rule = Arc::new(rule);
        self
    }

    /// Whether the gate is active (production mode).
    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Scope rule in use.
    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    fn health_response(&self) -> Response {
        (StatusCode::OK, Json(self.health.as_ref().clone())).into_response()
    }
}

/// `server-timing` value for the given trace and span.
pub fn server_timing_value(trace_id: TraceId, span_id: SpanId) -> String {
    format!("traceparent;desc=\"00-{trace_id}-{span_id}-01\"")
}

/// Span context active for the current request, if any.
///
/// Looks at the current `tracing` span first (bridged to OpenTelemetry by
/// the subscriber layer), then at the attached OpenTelemetry context.
pub fn active_span_context() -> Option<SpanContext> {
    let bridged = tracing::Span::current().context();
    let span_context = bridged.span().span_context().clone();
    if span_context.is_valid() {
        return Some(span_context);
    }

    let attached = opentelemetry::Context::current();
    let span_context = attached.span().span_context().clone();
    span_context.is_valid().then_some(span_context)
}

/// Gate middleware.
pub async fn gate_middleware(
    State(gate): State<Gate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !gate.production || !gate.rule.matches(&request) {
        return next.run(request).await;
    }

    if request.uri().path() == HEALTH_PATH {
        tracing::trace!(method = %request.method(), "health check");
        return gate.health_response();
    }

    let span_context = active_span_context();
    let mut response = next.run(request).await;

    if let Some(span_context) = span_context {
        let value = server_timing_value(span_context.trace_id(), span_context.span_id());
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                response.headers_mut().insert(SERVER_TIMING, value);
            }
            Err(e) => tracing::debug!(error = %e, "Skipping server-timing header"),
        }
    }

    response
}
