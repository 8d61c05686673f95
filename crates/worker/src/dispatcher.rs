//! Job dispatcher
//!
//! Owns the bounded [`JobQueue`], the [`WorkerRegistry`] and a fixed pool of
//! workers. A single coordination loop pairs the oldest queued job with an
//! idle worker, so at most `workers` jobs run while the queue holds the
//! backlog up to its capacity.

use crate::job::{Job, JobId, Payload};
use crate::queue::JobQueue;
use crate::registry::WorkerRegistry;
use crate::worker::{Worker, WorkerContext};
use cocoserve_common::config::DispatchConfig;
use cocoserve_common::{CocoError, Result, METRICS};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Entry point for request handlers
pub struct Dispatcher {
    queue: Arc<JobQueue>,
    registry: Arc<WorkerRegistry>,
    workers: usize,
    cancel: CancellationToken,
    tracker: TaskTracker,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool and the coordination loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &DispatchConfig, context: WorkerContext) -> Result<Self> {
        let workers = config.worker_count();
        let queue = Arc::new(JobQueue::new(config.queue_capacity, config.admission)?);
        let registry = Arc::new(WorkerRegistry::new(workers));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        for id in 0..workers {
            let worker = Worker::new(id, registry.clone(), context.clone(), cancel.clone());
            tracker.spawn(worker.run());
        }

        let coordinator = tokio::spawn(coordinate(queue.clone(), registry.clone()));

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            admission = ?config.admission,
            job_timeout_ms = config.job_timeout_ms,
            "Dispatcher started"
        );

        Ok(Self {
            queue,
            registry,
            workers,
            cancel,
            tracker,
            coordinator: Mutex::new(Some(coordinator)),
        })
    }

    /// Admit a request; completion is reported through the payload's sink
    ///
    /// Waits for a free queue slot or fails with `QueueFull`, depending on the
    /// configured admission policy.
    pub async fn submit(&self, payload: Payload) -> Result<JobId> {
        let job = Job::new(payload);
        let id = job.id();

        match self.queue.enqueue(job).await {
            Ok(sequence) => {
                METRICS.dispatch.jobs_submitted.inc();
                debug!(job_id = %id, sequence, "Job admitted");
                Ok(id)
            }
            Err(e) => {
                METRICS.dispatch.jobs_rejected.inc();
                debug!(job_id = %id, error = %e, "Job not admitted");
                Err(e)
            }
        }
    }

    /// Jobs waiting for a worker
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Workers currently waiting for a job
    pub fn idle_workers(&self) -> usize {
        self.registry.idle_count()
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Stop admitting jobs, finish every admitted job, then stop the workers
    pub async fn shutdown(&self) {
        info!(pending = self.queue.len(), "Dispatcher shutting down");
        self.queue.close();

        let coordinator = self.coordinator.lock().take();
        if let Some(handle) = coordinator {
            if let Err(e) = handle.await {
                error!(error = %e, "Coordination loop failed");
            }
        }

        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Without `shutdown` queued jobs are abandoned; their receivers see a closed channel.
        self.queue.close();
        if let Some(handle) = self.coordinator.get_mut().take() {
            handle.abort();
        }
        self.cancel.cancel();
    }
}

/// Pair jobs with idle workers until the queue is closed and drained
async fn coordinate(queue: Arc<JobQueue>, registry: Arc<WorkerRegistry>) {
    loop {
        // Take a worker first so a job only leaves the queue when it can run.
        let Some(ticket) = registry.next_available().await else {
            break;
        };
        let Some(job) = queue.dequeue().await else {
            break;
        };
        registry.claim();

        let worker_id = ticket.worker_id();
        let job_id = job.id();
        debug!(job_id = %job_id, worker_id, sequence = job.sequence(), "Job assigned");

        if let Err(job) = ticket.assign(job).await {
            warn!(job_id = %job_id, worker_id, "Worker exited before taking job");
            let refused = Err(CocoError::shutting_down("worker stopped"));
            if let Err(e) = job.payload.sink.deliver(refused) {
                METRICS.jobs.delivery_failures.inc();
                warn!(job_id = %job_id, error = %e, "Result not delivered");
            }
        }
    }
    debug!("Coordination loop finished");
}
