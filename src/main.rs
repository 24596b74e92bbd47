//! ritm: web front server with OpenTelemetry bootstrap and a health gate.
//!
//! # Usage
//!
//! ```bash
//! NODE_ENV=production NEXT_PUBLIC_CLIENT=acme ritm --port 3000
//! ```
//!
//! Environment variables can also be used:
//! - `NODE_ENV`: `production` enables telemetry and the health gate
//! - `NEXT_RUNTIME`: `nodejs` (full server, default) or `edge`
//! - `OTEL_COLLECTOR_GRPC_URL`: OTLP/gRPC trace collector endpoint
//! - `NEXT_PUBLIC_CLIENT`, `NEXT_PUBLIC_VERSION`: service identity
//! - `RITM_PORT`, `RITM_METRICS_PORT`: listen ports
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context;
use ritm_server::config::Config;
use ritm_server::observability::bootstrap;
use ritm_server::observability::tracing::{init_tracing, startup_dispatch};
use ritm_server::server::run_server;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config, telemetry: bool) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  ritm v{}

  Configuration:
    Address:      {}:{}
    Environment:  {}
    Runtime:      {}
    Telemetry:    {}
    Metrics Port: {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.host,
        config.port,
        config.environment,
        config.runtime,
        if telemetry { "enabled" } else { "disabled" },
        config.metrics_port,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start telemetry before anything is served; failures are fatal.
    // Its logs go to a console-only subscriber until tracing is initialized.
    let telemetry = {
        let _startup_logs = tracing::dispatcher::set_default(&startup_dispatch(&config));
        bootstrap(&config, shutdown_rx.clone())
            .await
            .context("telemetry bootstrap failed")?
    };

    // Initialize tracing/logging, bridged to OpenTelemetry when running
    init_tracing(&config, telemetry.as_ref().map(|t| t.tracer()))
        .context("failed to initialize tracing")?;

    // Print startup banner
    print_banner(&config, telemetry.is_some());

    // Spawn signal handler task
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        // Wait for SIGTERM or SIGINT (Ctrl+C)
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        // Signal shutdown
        let _ = shutdown_tx_clone.send(true);
    });

    // Run the server
    let served = run_server(&config, telemetry.as_ref(), shutdown_rx).await;

    // Stop background telemetry even when the server failed
    let _ = shutdown_tx.send(true);
    if let Some(telemetry) = telemetry {
        telemetry.shutdown().await;
    }

    served?;
    tracing::info!("ritm shutdown complete");
    Ok(())
}
