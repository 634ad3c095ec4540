//! Trace provider with a batching span processor.
//!
//! Finished spans are queued and exported in batches on the Tokio runtime.
//! [`TraceProvider::shutdown`] drains the queue and reports any export failure
//! to the caller, which owns the exit policy.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::Resource;

use super::exporter::SpanStreamExporter;
use super::TelemetryError;

/// Where finished spans are sent.
#[derive(Debug)]
pub enum TraceSink {
    /// JSON records on stdout.
    Stdout { pretty: bool },
    /// JSON records on a caller-supplied stream.
    Stream(SpanStreamExporter),
    /// OTLP/gRPC collector.
    Otlp { endpoint: String },
}

/// Trace provider bound to one exporter.
#[derive(Clone, Debug)]
pub struct TraceProvider {
    provider: TracerProvider,
}

impl TraceProvider {
    /// Build the provider. Must be called from within a Tokio runtime.
    pub fn new(resource: Resource, sink: TraceSink) -> Result<Self, TelemetryError> {
        let builder = TracerProvider::builder().with_resource(resource);

        let provider = match sink {
            TraceSink::Stdout { pretty } => builder
                .with_batch_exporter(
                    SpanStreamExporter::stdout().with_pretty_print(pretty),
                    runtime::Tokio,
                )
                .build(),
            TraceSink::Stream(exporter) => builder.with_batch_exporter(exporter, runtime::Tokio).build(),
            TraceSink::Otlp { endpoint } => {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint.as_str())
                    .build()
                    .map_err(|e| TelemetryError::Exporter(format!("otlp ({endpoint}): {e}")))?;
                tracing::info!(endpoint = %endpoint, "OTLP trace exporter configured");
                builder.with_batch_exporter(exporter, runtime::Tokio).build()
            }
        };

        Ok(Self { provider })
    }

    pub fn tracer(&self, name: &'static str) -> Tracer {
        self.provider.tracer(name)
    }

    /// Export every span still queued without shutting down.
    ///
    /// Waits on the batch processor from a blocking thread, like
    /// [`shutdown`](Self::shutdown).
    pub async fn force_flush(&self) -> Result<(), TelemetryError> {
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.force_flush())
            .await
            .map_err(|e| TelemetryError::Shutdown(format!("flush task failed: {e}")))?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map(|_| ())
            .map_err(|e| TelemetryError::Shutdown(e.to_string()))
    }

    /// Flush pending batches and stop the processor.
    ///
    /// Blocks (off the async worker threads) until the exporter has drained.
    /// An error means some finished spans were not delivered.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.shutdown())
            .await
            .map_err(|e| TelemetryError::Shutdown(format!("shutdown task failed: {e}")))?
            .map_err(|e| TelemetryError::Shutdown(e.to_string()))?;

        tracing::debug!("Trace provider shut down");
        Ok(())
    }
}
