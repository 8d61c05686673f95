//! CocoServe - Main Entry Point
//!
//! Loads the label table and detection model, starts the job dispatcher and
//! serves the HTTP front end until Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use cocoserve_common::ServeConfig;
use cocoserve_server::{build_app_router, AppState};
use cocoserve_worker::{
    load_engine, with_concurrency, Classifier, Dispatcher, HttpFetcher, InferenceEngine,
    LabelTable, ModelFile, WorkerContext,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServeConfig::from_env().context("failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CocoServe");
    info!(
        bind = %config.server.bind_address,
        port = config.server.port,
        workers = config.dispatch.worker_count(),
        queue_capacity = config.dispatch.queue_capacity,
        admission = ?config.dispatch.admission,
        "Configuration loaded"
    );

    // Startup failures are fatal; nothing is served until the classifier exists.
    let labels = LabelTable::load(&config.classifier.labels_path)?;
    info!(labels = labels.len(), "Label table loaded");

    let model = ModelFile::open(config.model_path())?;
    let engine = with_concurrency(load_engine(&model)?, config.classifier.engine_concurrency);
    info!(
        engine = engine.name(),
        concurrency = ?config.classifier.engine_concurrency,
        "Inference engine ready"
    );
    let classifier = Arc::new(Classifier::new(engine, labels));

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let context = WorkerContext {
        fetcher,
        threshold: config.classifier.threshold,
        job_timeout: config.dispatch.job_timeout(),
    };
    let dispatcher = Arc::new(Dispatcher::start(&config.dispatch, context)?);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address))?;

    let state = AppState {
        dispatcher: dispatcher.clone(),
        classifier,
        config: Arc::new(config),
    };
    let app = build_app_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "CocoServe listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped accepting connections, draining jobs");
    dispatcher.shutdown().await;

    info!("CocoServe shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
