//! Prometheus-backed metric provider.
//!
//! Key metrics:
//! - http_client_requests_total: Counter of health-check invocations
//! - http_client_request_duration_seconds: Histogram of outbound latency
//! - http_client_active_requests: Gauge of in-flight outbound requests
//!
//! Every series carries the `service_name` constant label from the identity
//! resource. The label is set on the registry itself, so it survives with
//! scope info and `target_info` disabled.

use std::collections::HashMap;
use std::fmt;

use opentelemetry::metrics::{Counter, Meter, MeterProvider as _};
use opentelemetry::Key;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use prometheus::{Encoder, Registry, TextEncoder};

use super::{TelemetryError, SERVICE_NAME};

/// Name of the health-check counter.
pub const HEALTH_CHECK_COUNTER: &str = "http_client_requests";

/// Constant label carrying the service name on every series.
pub const SERVICE_NAME_LABEL: &str = "service_name";

/// Content type of the Prometheus text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Metric provider with a single pull-style Prometheus reader.
#[derive(Clone)]
pub struct MetricProvider {
    provider: SdkMeterProvider,
    registry: Registry,
}

impl fmt::Debug for MetricProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricProvider")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl MetricProvider {
    /// Create a provider whose exporter registers into a private registry.
    ///
    /// The registry is labelled with the resource's `service.name`; a resource
    /// without one exports unlabelled series.
    pub fn new(resource: Resource) -> Result<Self, TelemetryError> {
        let labels = resource
            .get(Key::new(SERVICE_NAME))
            .map(|name| HashMap::from([(SERVICE_NAME_LABEL.to_string(), name.to_string())]));
        let registry = Registry::new_custom(None, labels)
            .map_err(|e| TelemetryError::Exporter(format!("prometheus registry: {e}")))?;
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .without_scope_info()
            .without_target_info()
            .build()
            .map_err(|e| TelemetryError::Exporter(format!("prometheus: {e}")))?;

        let provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(exporter)
            .build();

        tracing::debug!("Prometheus metric provider initialized");
        Ok(Self { provider, registry })
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.provider.meter(name)
    }

    /// Render all series in the text exposition format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encode(e.to_string()))
    }

    /// Pull-based export needs no teardown; this only releases the reader.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        self.provider
            .shutdown()
            .map_err(|e| TelemetryError::Shutdown(e.to_string()))
    }
}

/// Process-wide count of health-check invocations.
#[derive(Clone, Debug)]
pub struct HealthCheckCounter {
    counter: Counter<u64>,
}

impl HealthCheckCounter {
    pub fn new(meter: &Meter) -> Self {
        Self {
            counter: meter
                .u64_counter(HEALTH_CHECK_COUNTER)
                .with_description("Number of HTTP client requests")
                .build(),
        }
    }

    pub fn increment(&self) {
        self.counter.add(1, &[]);
    }
}
