//! GET /health handler.
//!
//! Probes the configured target through a freshly built instrumented client
//! and reports the outcome.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;

/// Operation name recorded on the outbound span.
pub const HEALTH_CHECK_OPERATION: &str = "health-check";

/// Handle GET /health.
///
/// - `200 OK` when the target answered 200
/// - the target's status when it answered anything else
/// - `500` when the outbound call itself failed
#[tracing::instrument(skip(state), fields(target = %state.target_url))]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let client = match state.client_builder.build(&state.client_config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to make outgoing request",
            );
        }
    };

    state.counter.increment();

    match client
        .get(HEALTH_CHECK_OPERATION, state.target_url.as_str())
        .await
    {
        Ok(response) if response.status() == StatusCode::OK => (StatusCode::OK, "OK"),
        Ok(response) => {
            tracing::warn!(status = %response.status(), "Outgoing request failed");
            (response.status(), "Outgoing request failed")
        }
        Err(e) => {
            tracing::warn!(error = %e, timeout = e.is_timeout(), "Failed to make outgoing request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to make outgoing request",
            )
        }
    }
}
