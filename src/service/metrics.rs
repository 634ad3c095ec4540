//! GET /metrics handler (Prometheus scrape).

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;
use crate::observability::metrics::TEXT_CONTENT_TYPE;

/// Handle GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, [("content-type", TEXT_CONTENT_TYPE)], body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}
