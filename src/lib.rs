//! Beacon: a health-check service with instrumented outbound HTTP calls.
//!
//! Every outbound request made through [`client::HttpClient`] produces one
//! OpenTelemetry client span and a set of metrics tagged with attributes
//! derived from the request URL.
//!
//! # Architecture
//!
//! - **Instrumented transport**: a `tower` layer over a pooled `reqwest` client
//! - **Explicit providers**: metric and trace providers are injected, never global
//! - **Pull metrics**: Prometheus text exposition on `/metrics`
//! - **Streamed traces**: one JSON record per finished span, or OTLP
//!
//! # Modules
//!
//! - [`client`]: attribute extraction, instrumented transport, client builder
//! - [`config`]: CLI and environment configuration
//! - [`observability`]: metric/trace providers, span exporter, logging setup
//! - [`server`]: HTTP server setup and lifecycle
//! - [`service`]: HTTP handlers (`/health`, `/metrics`)

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // client::error::ClientError is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod client;
pub mod config;
pub mod observability;
pub mod server;
pub mod service;

/// Service name baked into the telemetry identity resource by default.
pub const DEFAULT_SERVICE_NAME: &str = "health-service";
