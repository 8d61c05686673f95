use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use cocoserve_common::METRICS;

use crate::state::AppState;

/// GET /metrics -- Prometheus text exposition.
async fn metrics() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.gather(),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}
