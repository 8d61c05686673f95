//! Idle-worker registry
//!
//! Each idle worker publishes exactly one availability ticket. The dispatcher
//! takes a ticket before it takes a job, so a job never leaves the queue
//! without a worker ready to run it.

use crate::job::Job;
use cocoserve_common::METRICS;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::{trace, warn};

/// Worker index within the pool
pub type WorkerId = usize;

/// Proof that a worker is idle, plus the channel to hand it a job
#[derive(Debug, Clone)]
pub struct WorkerTicket {
    worker_id: WorkerId,
    inbox: mpsc::Sender<Job>,
}

impl WorkerTicket {
    pub(crate) fn new(worker_id: WorkerId, inbox: mpsc::Sender<Job>) -> Self {
        Self { worker_id, inbox }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Hand a job to this worker; returns the job if the worker has exited
    pub(crate) async fn assign(self, job: Job) -> std::result::Result<(), Job> {
        self.inbox.send(job).await.map_err(|e| e.0)
    }
}

/// Bounded collection of availability tickets, one per idle worker
pub struct WorkerRegistry {
    tx: mpsc::Sender<WorkerTicket>,
    rx: Mutex<mpsc::Receiver<WorkerTicket>>,
    idle: AtomicUsize,
}

impl WorkerRegistry {
    /// Registry for a pool of `workers` workers
    pub fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::channel(workers.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            idle: AtomicUsize::new(0),
        }
    }

    /// Publish a worker as available
    pub async fn register(&self, ticket: WorkerTicket) {
        let worker_id = ticket.worker_id;
        let idle = self.idle.fetch_add(1, Ordering::SeqCst) + 1;
        METRICS.dispatch.idle_workers.set(idle as i64);

        if self.tx.send(ticket).await.is_err() {
            // Receiver lives as long as the registry, so this is unreachable in practice.
            self.idle.fetch_sub(1, Ordering::SeqCst);
            warn!(worker_id, "Worker registry closed; ticket discarded");
            return;
        }
        trace!(worker_id, idle, "Worker registered as available");
    }

    /// Wait for and remove one availability ticket
    ///
    /// The worker still counts as idle until [`claim`](Self::claim) records
    /// that a job was paired with the ticket.
    pub async fn next_available(&self) -> Option<WorkerTicket> {
        self.rx.lock().await.recv().await
    }

    /// Record that a taken ticket has been matched with a job
    pub(crate) fn claim(&self) {
        let idle = self.idle.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        METRICS.dispatch.idle_workers.set(idle as i64);
    }

    /// Number of workers currently registered as available
    pub fn idle_count(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }
}
