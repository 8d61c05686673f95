use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` while admitting jobs, `shutting_down` afterwards.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub workers: usize,
    pub idle_workers: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

/// GET /health -- returns service and dispatcher state.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let dispatcher = &state.dispatcher;
    let status = if dispatcher.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        workers: dispatcher.worker_count(),
        idle_workers: dispatcher.idle_workers(),
        queue_depth: dispatcher.queue_depth(),
        queue_capacity: dispatcher.queue_capacity(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
