//! Test utilities for ritm server tests.
//!
//! Provides:
//! - Configuration fixtures
//! - Request and body helpers
//! - A raw HTTP scrape helper for the metrics endpoint

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use ritm_server::config::{Config, Environment, RuntimeKind};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Incoming W3C trace parent used by tests.
pub const PARENT_TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const PARENT_SPAN_ID: &str = "00f067aa0ba902b7";

/// Exact health response body.
pub const HEALTH_BODY: &str = r#"{"instance":"repro-require-in-the-middle","version":"0.1.0"}"#;

/// `traceparent` header value for the test parent span.
pub fn traceparent() -> String {
    format!("00-{PARENT_TRACE_ID}-{PARENT_SPAN_ID}-01")
}

/// Production configuration bound to loopback with ephemeral ports.
pub fn production_config() -> Config {
    Config {
        environment: Environment::Production,
        runtime: RuntimeKind::Server,
        collector_url: "http://127.0.0.1:4317".into(),
        ..Config::test_config()
    }
}

/// Build a GET request with optional headers.
pub fn get(path: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).expect("invalid request")
}

/// Collect a response body into a string.
pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    String::from_utf8(bytes.to_vec()).expect("body is not UTF-8")
}

/// Fetch `GET /metrics` over a plain TCP connection.
pub async fn scrape(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr)
        .await
        .expect("failed to connect to metrics endpoint");
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("failed to send scrape request");

    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .await
        .expect("failed to read scrape response");
    String::from_utf8_lossy(&buf).into_owned()
}
