//! Logging setup.
//!
//! Configures structured logging with:
//! - Environment-based filter (via RUST_LOG)
//! - Console output with target, thread and source location
//! - An OpenTelemetry layer so request spans join the exported traces

use opentelemetry_sdk::trace::Tracer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging.
///
/// When a tracer is given, `tracing` spans are exported through it and
/// become the parents of outbound client spans.
///
/// # Arguments
///
/// * `log_level` - Fallback filter when `RUST_LOG` is unset
/// * `tracer` - Optional tracer bridging `tracing` spans into OpenTelemetry
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(log_level: &str, tracer: Option<Tracer>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    tracing::info!(level = log_level, "Logging initialized");
}

/// Initialize logging for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
