//! Classification endpoints.
//!
//! Both routes build a payload, submit it to the dispatcher and wait on the
//! payload's response channel. Dropping the request (client disconnect) drops
//! the receiver; the worker then logs a delivery failure and moves on.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Form, Router};
use cocoserve_worker::{ClassifiedImage, ImageSource, JobId, Payload, ResponseSink};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Header listing the label texts drawn onto the returned image.
pub const DETECTIONS_HEADER: HeaderName = HeaderName::from_static("x-detections");

/// Header carrying the dispatcher's job id.
pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-job-id");

/// Form body of `POST /dyn/classify`.
#[derive(Debug, Deserialize)]
pub struct ClassifyForm {
    /// URL of the image to classify.
    #[serde(default)]
    pub filename: String,
}

/// POST /dyn/classify -- classify the image at the submitted URL.
async fn classify_url(
    State(state): State<AppState>,
    Form(form): Form<ClassifyForm>,
) -> AppResult<Response> {
    let url = form.filename.trim();
    if url.is_empty() {
        return Err(AppError::BadRequest("form field `filename` is required".to_string()));
    }

    run_job(&state, ImageSource::Url(url.to_string())).await
}

/// POST /dyn/classify/bytes -- classify the image sent as the request body.
async fn classify_bytes(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    if body.is_empty() {
        return Err(AppError::BadRequest("request body is empty".to_string()));
    }

    run_job(&state, ImageSource::Bytes(body.to_vec())).await
}

async fn run_job(state: &AppState, source: ImageSource) -> AppResult<Response> {
    let (sink, receiver) = ResponseSink::channel();
    let payload = Payload::new(source, sink, state.classifier.clone());

    let job_id = state.dispatcher.submit(payload).await?;

    let image = receiver.await.map_err(|_| {
        AppError::InternalError(format!("job {} ended without a result", job_id))
    })??;

    Ok(image_response(job_id, image))
}

fn image_response(job_id: JobId, image: ClassifiedImage) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
        headers.insert(JOB_ID_HEADER, value);
    }
    // Label names outside visible ASCII cannot go into a header; the image still carries them.
    if let Ok(value) = HeaderValue::from_str(&image.labels.join(", ")) {
        headers.insert(DETECTIONS_HEADER, value);
    }

    (headers, image.jpeg).into_response()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dyn/classify", post(classify_url))
        .route("/dyn/classify/bytes", post(classify_bytes))
}
