use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cocoserve_common::CocoError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CocoError`] for dispatch and job failures and adds HTTP-specific
/// variants. Every error renders as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Coco(#[from] CocoError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Coco(err) => classify_coco_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a dispatch or job error to an HTTP status, error code and message.
///
/// - Admission refusals map to 503.
/// - Retrieval failures map to 502, undecodable images to 422.
/// - Job timeouts map to 504.
/// - Everything else maps to 500; non-job errors get a sanitized message.
fn classify_coco_error(err: &CocoError) -> (StatusCode, &'static str, String) {
    let status = match err {
        CocoError::QueueFull(_) | CocoError::ShuttingDown(_) => StatusCode::SERVICE_UNAVAILABLE,
        CocoError::Fetch(_) => StatusCode::BAD_GATEWAY,
        CocoError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CocoError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if err.is_per_job() || err.is_admission() {
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(error = %err, "Job failed");
        }
        return (status, err.kind(), err.to_string());
    }

    tracing::error!(error = %err, "Internal error");
    (
        status,
        err.kind(),
        "An internal error occurred".to_string(),
    )
}
