//! Test utilities for Beacon integration tests.
//!
//! Provides:
//! - An in-process upstream HTTP server
//! - Telemetry wired to an in-memory span sink
//! - Polling helpers

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use beacon::client::{ClientBuilder, ClientConfig, HttpClient};
use beacon::observability::exporter::{MemorySink, SpanStreamExporter};
use beacon::observability::{Telemetry, TraceSink};
use futures::stream::{self, StreamExt};
use tokio::net::TcpListener;

/// Upstream server the instrumented client talks to.
///
/// Routes:
/// - `/status/:code` answers with the given status
/// - `/delay/:secs` answers after sleeping
/// - `/stall/:secs` sends the head and a first chunk, then stalls the body
/// - `/traceparent` echoes the received `traceparent` header
pub struct Upstream {
    pub addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl Upstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind upstream");
        let addr = listener.local_addr().expect("no local addr");

        let app = Router::new()
            .route("/status/:code", get(status))
            .route("/delay/:secs", get(delay))
            .route("/stall/:secs", get(stall))
            .route("/traceparent", get(echo_traceparent));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Upstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn delay(Path(secs): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    "late"
}

async fn stall(Path(secs): Path<u64>) -> Body {
    let first = stream::once(async { Ok::<_, Infallible>("partial") });
    let rest = stream::once(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok::<_, Infallible>("rest")
    });
    Body::from_stream(first.chain(rest))
}

async fn echo_traceparent(headers: HeaderMap) -> String {
    headers
        .get("traceparent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    listener.local_addr().expect("no local addr")
}

/// Telemetry whose spans land in memory.
pub struct TestTelemetry {
    pub telemetry: Telemetry,
    pub spans: MemorySink,
}

impl TestTelemetry {
    /// Must be called from within a multi-threaded Tokio runtime.
    pub fn new(service_name: &str) -> Self {
        let spans = MemorySink::default();
        let telemetry = Telemetry::init(
            service_name,
            TraceSink::Stream(SpanStreamExporter::new(spans.clone())),
        )
        .expect("failed to init telemetry");
        Self { telemetry, spans }
    }

    pub fn client(&self, config: &ClientConfig) -> HttpClient {
        ClientBuilder::new(
            self.telemetry.traces.tracer("http-client"),
            &self.telemetry.metrics.meter("http-client"),
        )
        .build(config)
        .expect("failed to build client")
    }

    /// Drain the trace pipeline and return every exported span record.
    pub async fn finish(self) -> Vec<serde_json::Value> {
        self.telemetry
            .shutdown()
            .await
            .expect("telemetry shutdown failed");
        self.spans.records()
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Find the value of the first sample of `name` in text exposition output.
pub fn sample_value(exposition: &str, name: &str) -> Option<f64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
