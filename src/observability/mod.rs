//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - Metric provider with a Prometheus scrape sink
//! - Trace provider with a batching, streaming span exporter
//! - Structured logging bridged into the trace pipeline
//! - W3C trace-context propagation over HTTP headers
//!
//! Providers are built once at startup and passed to whoever needs them;
//! nothing here is registered globally.

pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod trace;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use thiserror::Error;

pub use metrics::{HealthCheckCounter, MetricProvider};
pub use trace::{TraceProvider, TraceSink};

/// Resource attribute naming the service.
pub const SERVICE_NAME: &str = "service.name";

/// Telemetry pipeline errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// An exporter could not be initialized. Fatal at startup.
    #[error("failed to initialize exporter: {0}")]
    Exporter(String),

    /// Metrics could not be rendered for a scrape.
    #[error("failed to encode metrics: {0}")]
    Encode(String),

    /// Pending telemetry could not be delivered during shutdown.
    #[error("telemetry shutdown failed: {0}")]
    Shutdown(String),
}

/// Identity resource attached to every exported metric and span.
pub fn service_resource(service_name: impl Into<String>) -> Resource {
    Resource::new([KeyValue::new(SERVICE_NAME, service_name.into())])
}

/// The process-wide metric and trace providers.
#[derive(Clone, Debug)]
pub struct Telemetry {
    pub metrics: MetricProvider,
    pub traces: TraceProvider,
}

impl Telemetry {
    /// Build both providers around one identity resource.
    pub fn init(service_name: &str, sink: TraceSink) -> Result<Self, TelemetryError> {
        let resource = service_resource(service_name.to_string());
        let metrics = MetricProvider::new(resource.clone())?;
        let traces = TraceProvider::new(resource, sink)?;
        Ok(Self { metrics, traces })
    }

    /// Release the metric reader, then drain the trace pipeline.
    ///
    /// Metric shutdown failures are logged; trace shutdown failures are
    /// returned because the spans they carry cannot be recovered.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        if let Err(e) = self.metrics.shutdown() {
            tracing::warn!(error = %e, "Metric provider shutdown failed");
        }
        self.traces.shutdown().await
    }
}
