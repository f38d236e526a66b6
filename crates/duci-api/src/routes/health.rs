//! Health check endpoints.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Reports the container daemon's reachability and gate occupancy.
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let runtime = state.executor.runtime();
    runtime
        .status()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    let gate = state.executor.gate();
    Ok(Json(json!({
        "status": "ok",
        "runtime": runtime.name(),
        "running": gate.running(),
        "capacity": gate.capacity(),
    })))
}
