//! HTTP server setup and lifecycle.
//!
//! Configures the axum server with:
//! - `/health` and `/metrics` handlers
//! - One server span per inbound request, parented on the caller's
//!   `traceparent` when present
//! - Graceful shutdown support

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::{body::Body, http::Request, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use url::Url;

use crate::config::Config;
use crate::observability::propagation::extract_trace_context;
use crate::observability::Telemetry;
use crate::service::health::health_handler;
use crate::service::metrics::metrics_handler;
use crate::service::AppState;

/// Operation name of inbound request spans.
pub const SERVER_OPERATION: &str = "health-server";

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let span = tracing::info_span!(
                    "request",
                    otel.name = SERVER_OPERATION,
                    otel.kind = "server",
                    http.request.method = %request.method(),
                    url.path = %request.uri().path(),
                );
                span.set_parent(extract_trace_context(request.headers()));
                span
            }),
        )
        .with_state(state)
}

/// Run the Beacon HTTP server.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `telemetry` - Metric and trace providers used by the handlers
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns when the server has drained after a shutdown signal.
pub async fn run_server(
    config: &Config,
    telemetry: &Telemetry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;
    let client_config = config.client_config()?;
    let target_url = Url::parse(&config.target_url).context("invalid target URL")?;

    let state = AppState::new(telemetry, client_config, target_url);
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(address = %addr, "Starting Beacon HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
