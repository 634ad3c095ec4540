//! Configuration parsing for the Beacon server.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;

use crate::client::{ClientConfig, ConfigError};
use crate::observability::TraceSink;
use crate::DEFAULT_SERVICE_NAME;

/// Beacon: a health-check service with instrumented outbound calls.
#[derive(Parser, Debug, Clone)]
#[command(name = "beacon")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "BEACON_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "BEACON_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Service name attached to every exported metric and span
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// URL probed by each health check
    #[arg(long, env = "BEACON_TARGET_URL", default_value = "https://httpbin.org/status/200")]
    pub target_url: String,

    /// Outbound request timeout in seconds (0 disables it)
    #[arg(long, env = "BEACON_TIMEOUT_SECS", default_value_t = 2.0, allow_negative_numbers = true)]
    pub timeout_secs: f64,

    /// OpenTelemetry collector endpoint for span export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Pretty-print span records written to stdout
    #[arg(long, env = "BEACON_TRACE_PRETTY")]
    pub trace_pretty: bool,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Options for the clients built by the health endpoint.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        ClientConfig::builder().timeout_secs(self.timeout_secs).build()
    }

    /// Span sink selected by the configuration: OTLP when an endpoint is set.
    pub fn trace_sink(&self) -> TraceSink {
        match &self.otel_endpoint {
            Some(endpoint) => TraceSink::Otlp {
                endpoint: endpoint.clone(),
            },
            None => TraceSink::Stdout {
                pretty: self.trace_pretty,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            log_level: "info".into(),
            service_name: DEFAULT_SERVICE_NAME.into(),
            target_url: "https://httpbin.org/status/200".into(),
            timeout_secs: 2.0,
            otel_endpoint: None,
            trace_pretty: false,
        }
    }
}
