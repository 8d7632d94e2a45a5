//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use resilience::CircuitState;
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while any dependency circuit is open.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub open_circuits: Vec<String>,
}

/// GET /health: returns system health status.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let open_circuits: Vec<String> = state
        .pipeline
        .circuit_states()
        .into_iter()
        .filter(|c| c.snapshot.state == CircuitState::Open)
        .map(|c| c.dependency)
        .collect();

    let status = if open_circuits.is_empty() {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        open_circuits,
    })
}
