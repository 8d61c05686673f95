//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use cocoserve_common::config::DispatchConfig;
use cocoserve_common::{AdmissionPolicy, CocoError, Result, ServeConfig};
use cocoserve_server::{build_app_router, AppState};
use cocoserve_worker::{
    Classifier, Dispatcher, EngineOutput, ImageFetcher, ImageTensor, InferenceEngine, LabelTable,
    WorkerContext,
};

/// Engine that always reports one dog at 91% and a cat below threshold.
pub struct DogEngine;

impl InferenceEngine for DogEngine {
    fn run(&self, _input: &ImageTensor) -> Result<EngineOutput> {
        Ok(EngineOutput {
            boxes: vec![[0.1, 0.1, 0.7, 0.8], [0.2, 0.2, 0.4, 0.4]],
            scores: vec![0.91, 0.3],
            classes: vec![1.0, 0.0],
            count: 2,
        })
    }
}

/// Fetcher that answers every URL with the same PNG.
pub struct StaticFetcher(pub Vec<u8>);

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Fetcher that fails every request.
pub struct NotFoundFetcher;

#[async_trait]
impl ImageFetcher for NotFoundFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(CocoError::fetch(format!("{url} returned 404 Not Found")))
    }
}

pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 64]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn test_config() -> ServeConfig {
    ServeConfig {
        dispatch: DispatchConfig {
            workers: 2,
            queue_capacity: 4,
            admission: AdmissionPolicy::Reject,
            job_timeout_ms: 5_000,
        },
        ..Default::default()
    }
}

/// Build the full application router around a fresh dispatcher.
pub fn build_test_app(fetcher: Arc<dyn ImageFetcher>) -> (Router, Arc<Dispatcher>) {
    let config = test_config();
    let classifier = Arc::new(Classifier::new(
        Box::new(DogEngine),
        LabelTable::from_lines(["cat", "dog"]),
    ));
    let context = WorkerContext {
        fetcher,
        threshold: config.classifier.threshold,
        job_timeout: Duration::from_millis(config.dispatch.job_timeout_ms),
    };
    let dispatcher = Arc::new(Dispatcher::start(&config.dispatch, context).unwrap());

    let state = AppState {
        dispatcher: dispatcher.clone(),
        classifier,
        config: Arc::new(config),
    };
    (build_app_router(state), dispatcher)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_form(app: Router, uri: &str, form: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_bytes(app: Router, uri: &str, bytes: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
