//! Long-lived workers
//!
//! A worker registers as available, waits for one job, runs that job's whole
//! pipeline, and registers again. Every error raised by a job is delivered to
//! the job's sink; nothing a job does can end the worker loop.

use crate::classifier::Classifier;
use crate::fetch::{self, ImageFetcher, ImageSource};
use crate::job::{Job, JobId, JobResult, Payload};
use crate::pipeline;
use crate::registry::{WorkerId, WorkerRegistry, WorkerTicket};
use cocoserve_common::{CocoError, METRICS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared, read-only state every worker needs
#[derive(Clone)]
pub struct WorkerContext {
    /// Network fetch primitive
    pub fetcher: Arc<dyn ImageFetcher>,

    /// Detections must score strictly above this to be drawn
    pub threshold: f32,

    /// Per-job time budget
    pub job_timeout: Duration,
}

/// How a job's pipeline ended
enum Outcome {
    /// Pipeline finished, successfully or not
    Done(JobResult),

    /// Deadline passed while the engine call was still running
    TimedOut(JoinHandle<JobResult>),
}

pub(crate) struct Worker {
    id: WorkerId,
    ticket: WorkerTicket,
    inbox: mpsc::Receiver<Job>,
    registry: Arc<WorkerRegistry>,
    context: WorkerContext,
    cancel: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        registry: Arc<WorkerRegistry>,
        context: WorkerContext,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, inbox) = mpsc::channel(1);
        Self {
            id,
            ticket: WorkerTicket::new(id, tx),
            inbox,
            registry,
            context,
            cancel,
        }
    }

    /// Worker loop; returns once cancelled while idle
    pub(crate) async fn run(mut self) {
        debug!(worker_id = self.id, "Worker started");

        loop {
            self.registry.register(self.ticket.clone()).await;

            let job = tokio::select! {
                biased;
                job = self.inbox.recv() => job,
                _ = self.cancel.cancelled() => None,
            };

            match job {
                Some(job) => self.execute(job).await,
                None => break,
            }
        }

        debug!(worker_id = self.id, "Worker stopped");
    }

    async fn execute(&self, job: Job) {
        let Job {
            id,
            sequence,
            enqueued_at,
            payload,
        } = job;
        let Payload {
            source,
            sink,
            classifier,
        } = payload;

        METRICS
            .dispatch
            .queue_wait
            .observe(enqueued_at.elapsed().as_secs_f64());
        METRICS.jobs.active_jobs.inc();
        let started = Instant::now();
        debug!(
            job_id = %id,
            sequence,
            worker_id = self.id,
            source = %source.describe(),
            "Job started"
        );

        let outcome = self.run_pipeline(id, source, classifier).await;
        let (result, pending) = match outcome {
            Outcome::Done(result) => (result, None),
            Outcome::TimedOut(handle) => (
                Err(CocoError::timeout(format!(
                    "job exceeded {:?}",
                    self.context.job_timeout
                ))),
                Some(handle),
            ),
        };

        match &result {
            Ok(image) => {
                METRICS.jobs.jobs_succeeded.inc();
                info!(
                    job_id = %id,
                    worker_id = self.id,
                    detections = image.labels.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
            }
            Err(e) => {
                METRICS.jobs.jobs_failed.inc();
                warn!(job_id = %id, worker_id = self.id, error = %e, "Job failed");
            }
        }

        if let Err(e) = sink.deliver(result) {
            METRICS.jobs.delivery_failures.inc();
            warn!(job_id = %id, error = %e, "Result not delivered");
        }

        if let Some(handle) = pending {
            // The engine call cannot be interrupted; stay busy until it returns.
            let _ = handle.await;
            debug!(job_id = %id, worker_id = self.id, "Timed-out engine call returned");
        }

        METRICS.jobs.active_jobs.dec();
        METRICS
            .jobs
            .job_duration
            .observe(started.elapsed().as_secs_f64());
    }

    async fn run_pipeline(
        &self,
        id: JobId,
        source: ImageSource,
        classifier: Arc<Classifier>,
    ) -> Outcome {
        let deadline = tokio::time::Instant::now() + self.context.job_timeout;

        let bytes = match tokio::time::timeout_at(
            deadline,
            fetch::acquire(self.context.fetcher.as_ref(), source),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Outcome::Done(Err(e)),
            Err(_) => {
                return Outcome::Done(Err(CocoError::timeout(format!(
                    "image retrieval exceeded {:?}",
                    self.context.job_timeout
                ))))
            }
        };

        let threshold = self.context.threshold;
        let mut handle =
            tokio::task::spawn_blocking(move || pipeline::process(&bytes, &classifier, threshold));

        tokio::select! {
            joined = &mut handle => Outcome::Done(flatten(id, joined)),
            _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut(handle),
        }
    }
}

fn flatten(id: JobId, joined: std::result::Result<JobResult, JoinError>) -> JobResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            error!(job_id = %id, "Pipeline panicked");
            Err(CocoError::inference("inference pipeline panicked"))
        }
        Err(e) => Err(CocoError::internal(format!("pipeline task failed: {}", e))),
    }
}
