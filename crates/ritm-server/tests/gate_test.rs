//! End-to-end tests for the request gate on the full application router.
//!
//! The router is built exactly as the binary builds it, and a `tracing`
//! subscriber with the OpenTelemetry bridge is installed so the request span
//! is the active span the gate reads.

mod common;

use axum::http::StatusCode;
use common::{
    body_string, get, production_config, traceparent, HEALTH_BODY, PARENT_SPAN_ID,
    PARENT_TRACE_ID,
};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use ritm_server::config::Config;
use ritm_server::server::build_router;
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

/// Install a thread-local subscriber bridging `tracing` spans to OpenTelemetry.
fn install_bridge() -> (DefaultGuard, TracerProvider) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = TracerProvider::builder().build();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("gate-test")));
    (tracing::subscriber::set_default(subscriber), provider)
}

fn server_timing(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get("server-timing")
        .map(|value| value.to_str().unwrap().to_string())
}

#[tokio::test]
async fn test_server_timing_continues_incoming_trace() {
    let (_guard, _provider) = install_bridge();
    let router = build_router(&production_config(), None);

    let parent = traceparent();
    let response = router
        .oneshot(get("/", &[("traceparent", parent.as_str())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let value = server_timing(&response).expect("server-timing header missing");
    let prefix = format!("traceparent;desc=\"00-{PARENT_TRACE_ID}-");
    assert!(value.starts_with(&prefix), "unexpected header: {value}");
    assert!(value.ends_with("-01\""), "unexpected header: {value}");

    // The stamped span is the request span, a child of the incoming one.
    let span_id = &value[prefix.len()..prefix.len() + 16];
    assert_ne!(span_id, PARENT_SPAN_ID);
    assert!(span_id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_server_timing_on_root_trace() {
    let (_guard, _provider) = install_bridge();
    let router = build_router(&production_config(), None);

    let response = router.oneshot(get("/missing", &[])).await.unwrap();

    // Downstream status is preserved; only the header is added.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let value = server_timing(&response).expect("server-timing header missing");
    // traceparent;desc="00-<32 hex>-<16 hex>-01"
    assert_eq!(value.len(), "traceparent;desc=\"00-".len() + 32 + 1 + 16 + 4);
    assert_eq!(body_string(response).await, "Not Found");
}

#[tokio::test]
async fn test_health_with_full_router() {
    let (_guard, _provider) = install_bridge();
    let router = build_router(&production_config(), None);

    let response = router.oneshot(get("/health", &[])).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(server_timing(&response).is_none());
    assert_eq!(body_string(response).await, HEALTH_BODY);
}

#[tokio::test]
async fn test_assets_and_prefetches_are_never_stamped() {
    let (_guard, _provider) = install_bridge();
    let router = build_router(&production_config(), None);

    let cases: [(&str, &[(&str, &str)]); 4] = [
        ("/_next/static/chunks/main.js", &[]),
        ("/_next/image?url=%2Flogo.png&w=64", &[]),
        ("/", &[("next-router-prefetch", "1")]),
        ("/", &[("purpose", "prefetch")]),
    ];

    for (path, headers) in cases {
        let response = router.clone().oneshot(get(path, headers)).await.unwrap();
        assert!(
            server_timing(&response).is_none(),
            "{path} {headers:?} should bypass the gate"
        );
    }
}

#[tokio::test]
async fn test_development_is_pure_pass_through() {
    let (_guard, _provider) = install_bridge();
    let router = build_router(&Config::test_config(), None);

    let response = router.clone().oneshot(get("/health", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let parent = traceparent();
    let response = router
        .oneshot(get("/", &[("traceparent", parent.as_str())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(server_timing(&response).is_none());
}
