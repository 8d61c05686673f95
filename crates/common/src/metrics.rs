//! Metrics collection for CocoServe
//!
//! This module provides Prometheus metrics for the dispatch core.
//! Updates are plain atomic operations so they can sit on the job hot path.

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for CocoServe
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub dispatch: DispatchMetrics,
    pub jobs: JobMetrics,
}

/// Admission and scheduling metrics
#[derive(Debug, Clone)]
pub struct DispatchMetrics {
    /// Jobs admitted into the queue
    pub jobs_submitted: IntCounter,

    /// Submissions refused (queue full or shutting down)
    pub jobs_rejected: IntCounter,

    /// Current depth of the job queue
    pub queue_depth: IntGauge,

    /// Workers currently registered as available
    pub idle_workers: IntGauge,

    /// Time jobs spend queued before a worker takes them
    pub queue_wait: Histogram,
}

/// Per-job execution metrics
#[derive(Debug, Clone)]
pub struct JobMetrics {
    /// Jobs currently executing their pipeline
    pub active_jobs: IntGauge,

    /// Jobs that delivered an annotated image
    pub jobs_succeeded: IntCounter,

    /// Jobs that delivered a failure result
    pub jobs_failed: IntCounter,

    /// Results that could not be delivered to their sink
    pub delivery_failures: IntCounter,

    /// Full pipeline duration
    pub job_duration: Histogram,

    /// Engine call duration
    pub inference_duration: Histogram,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

fn register<M>(registry: &Registry, metric: M) -> M
where
    M: Collector + Clone + 'static,
{
    registry
        .register(Box::new(metric.clone()))
        .expect("metric names are unique within the registry");
    metric
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register(registry, IntCounter::new(name, help).expect("valid counter definition"))
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register(registry, IntGauge::new(name, help).expect("valid gauge definition"))
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> Histogram {
    let opts = HistogramOpts::new(name, help).buckets(buckets);
    register(registry, Histogram::with_opts(opts).expect("valid histogram definition"))
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let dispatch = DispatchMetrics {
            jobs_submitted: counter(
                &registry,
                "dispatch_jobs_submitted_total",
                "Total number of jobs admitted into the queue",
            ),
            jobs_rejected: counter(
                &registry,
                "dispatch_jobs_rejected_total",
                "Total number of submissions refused",
            ),
            queue_depth: gauge(
                &registry,
                "dispatch_queue_depth",
                "Current depth of the job queue",
            ),
            idle_workers: gauge(
                &registry,
                "dispatch_idle_workers",
                "Workers currently registered as available",
            ),
            queue_wait: histogram(
                &registry,
                "dispatch_queue_wait_seconds",
                "Time jobs spend queued before a worker takes them",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0],
            ),
        };

        let jobs = JobMetrics {
            active_jobs: gauge(
                &registry,
                "job_active",
                "Jobs currently executing their pipeline",
            ),
            jobs_succeeded: counter(
                &registry,
                "job_succeeded_total",
                "Total number of jobs that delivered an annotated image",
            ),
            jobs_failed: counter(
                &registry,
                "job_failed_total",
                "Total number of jobs that delivered a failure result",
            ),
            delivery_failures: counter(
                &registry,
                "job_delivery_failures_total",
                "Total number of results that could not be delivered",
            ),
            job_duration: histogram(
                &registry,
                "job_duration_seconds",
                "Full pipeline duration in seconds",
                vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            ),
            inference_duration: histogram(
                &registry,
                "job_inference_duration_seconds",
                "Inference engine call duration in seconds",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            ),
        };

        MetricsRegistry {
            registry,
            dispatch,
            jobs,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# failed to encode metrics: {}\n", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper trait for measuring latency
pub trait LatencyTimer {
    /// Observe the duration of a closure
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R;
}

impl LatencyTimer for Histogram {
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = std::time::Instant::now();
        let result = f();
        self.observe(start.elapsed().as_secs_f64());
        result
    }
}
