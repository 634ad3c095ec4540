//! Beacon: a health-check service with instrumented outbound calls.
//!
//! # Usage
//!
//! ```bash
//! beacon --port 8080 --target-url https://httpbin.org/status/200 --timeout-secs 2
//! ```
//!
//! Environment variables can also be used:
//! - `BEACON_PORT`: Port to listen on
//! - `BEACON_TARGET_URL`: URL probed by `/health`
//! - `OTEL_SERVICE_NAME`: Service name on every metric and span
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Send spans to a collector instead of stdout
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context as _;
use beacon::config::Config;
use beacon::observability::logging::init_tracing;
use beacon::observability::Telemetry;
use beacon::server::{run_server, SERVER_OPERATION};
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Beacon v{} - instrumented health checks

  Configuration:
    Address:    {}:{}
    Service:    {}
    Target:     {}
    Timeout:    {}s
    Traces:     {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.host,
        config.port,
        config.service_name,
        config.target_url,
        config.timeout_secs,
        config.otel_endpoint.as_deref().unwrap_or("stdout"),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Build the metric and trace providers; an exporter that cannot start is fatal
    let telemetry = Telemetry::init(&config.service_name, config.trace_sink())
        .context("failed to initialize telemetry")?;

    // Initialize logging, bridged into the trace pipeline
    init_tracing(
        &config.log_level,
        Some(telemetry.traces.tracer(SERVER_OPERATION)),
    );

    print_banner(&config);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
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

        let _ = shutdown_tx.send(true);
    });

    let served = run_server(&config, &telemetry, shutdown_rx).await;

    // Undelivered spans cannot be recovered after exit: a failed flush is fatal
    if let Err(e) = telemetry.shutdown().await {
        tracing::error!(error = %e, "Failed to flush telemetry");
        return Err(e).context("telemetry shutdown failed");
    }

    served?;
    tracing::info!("Beacon shutdown complete");
    Ok(())
}
