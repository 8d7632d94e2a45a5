//! Circuit breaker inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct CircuitResponse {
    pub dependency: String,
    pub state: &'static str,
    /// Outcomes in the current window.
    pub buffered_calls: usize,
    pub failed_calls: usize,
}

/// GET /circuits: circuit breaker state per dependency.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<CircuitResponse>> {
    let circuits = state
        .pipeline
        .circuit_states()
        .into_iter()
        .map(|c| CircuitResponse {
            dependency: c.dependency,
            state: c.snapshot.state.as_str(),
            buffered_calls: c.snapshot.buffered_calls,
            failed_calls: c.snapshot.failed_calls,
        })
        .collect();
    Json(circuits)
}
