//! HTTP handlers for Beacon.

pub mod health;
pub mod metrics;

use std::sync::Arc;

use url::Url;

use crate::client::{ClientBuilder, ClientConfig};
use crate::observability::{HealthCheckCounter, MetricProvider, Telemetry};

/// Instrumentation scope used for outbound client telemetry.
pub const CLIENT_SCOPE: &str = "http-client";

/// Shared state injected into handlers.
#[derive(Debug)]
pub struct AppState {
    pub client_builder: ClientBuilder,
    pub client_config: ClientConfig,
    pub counter: HealthCheckCounter,
    pub target_url: Url,
    pub metrics: MetricProvider,
}

impl AppState {
    /// Wire handler state from the process telemetry.
    pub fn new(telemetry: &Telemetry, client_config: ClientConfig, target_url: Url) -> Arc<Self> {
        let meter = telemetry.metrics.meter(CLIENT_SCOPE);
        Arc::new(Self {
            client_builder: ClientBuilder::new(telemetry.traces.tracer(CLIENT_SCOPE), &meter),
            client_config,
            counter: HealthCheckCounter::new(&meter),
            target_url,
            metrics: telemetry.metrics.clone(),
        })
    }
}
