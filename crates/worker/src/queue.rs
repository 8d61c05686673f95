//! Bounded FIFO job queue with explicit backpressure
//!
//! Capacity is enforced with a semaphore of free slots. A slot is taken on
//! enqueue and returned only when the dispatcher removes the job, so at most
//! `capacity` jobs are ever buffered. What happens on a full queue is fixed at
//! construction by [`AdmissionPolicy`] and never mixed.

use crate::job::Job;
use cocoserve_common::{AdmissionPolicy, CocoError, Result, METRICS};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Notify, Semaphore, TryAcquireError};
use tracing::{debug, trace};

/// Bounded job queue shared by producers and the dispatcher
pub struct JobQueue {
    /// Full-queue policy
    policy: AdmissionPolicy,

    /// Maximum number of buffered jobs
    capacity: usize,

    /// Buffered jobs, oldest first
    items: Mutex<VecDeque<Job>>,

    /// Free slots
    slots: Semaphore,

    /// Signalled when a job is pushed or the queue closes
    ready: Notify,

    /// Set once by `close`, read under the `items` lock
    closed: AtomicBool,

    /// Admission sequence counter
    next_sequence: AtomicU64,
}

impl JobQueue {
    /// Create a queue with `capacity` slots (must be non-zero)
    pub fn new(capacity: usize, policy: AdmissionPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(CocoError::config("job queue capacity must be at least 1"));
        }

        Ok(Self {
            policy,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            next_sequence: AtomicU64::new(0),
        })
    }

    /// Admit a job, returning its admission sequence number
    ///
    /// Under [`AdmissionPolicy::Block`] this suspends until a slot frees; under
    /// [`AdmissionPolicy::Reject`] a full queue fails with `QueueFull`. Both
    /// fail with `ShuttingDown` once the queue is closed.
    pub async fn enqueue(&self, mut job: Job) -> Result<u64> {
        let permit = match self.policy {
            AdmissionPolicy::Block => self
                .slots
                .acquire()
                .await
                .map_err(|_| CocoError::shutting_down("job queue is closed"))?,
            AdmissionPolicy::Reject => self.slots.try_acquire().map_err(|e| match e {
                TryAcquireError::NoPermits => CocoError::queue_full(format!(
                    "{} jobs already waiting",
                    self.capacity
                )),
                TryAcquireError::Closed => CocoError::shutting_down("job queue is closed"),
            })?,
        };

        let (sequence, depth) = {
            let mut items = self.items.lock();
            if self.closed.load(Ordering::Acquire) {
                // Permit drops here and returns the slot.
                return Err(CocoError::shutting_down("job queue is closed"));
            }
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            job.sequence = sequence;
            job.enqueued_at = Instant::now();
            items.push_back(job);
            (sequence, items.len())
        };
        // The slot now belongs to the buffered job until `dequeue` returns it.
        permit.forget();

        METRICS.dispatch.queue_depth.set(depth as i64);
        self.ready.notify_one();

        trace!(sequence, depth, "Job enqueued");
        Ok(sequence)
    }

    /// Remove the oldest job, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn dequeue(&self) -> Option<Job> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut items = self.items.lock();
                if let Some(job) = items.pop_front() {
                    let depth = items.len();
                    drop(items);

                    self.slots.add_permits(1);
                    METRICS.dispatch.queue_depth.set(depth as i64);
                    return Some(job);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop admitting jobs; already-buffered jobs can still be dequeued
    pub fn close(&self) {
        {
            let _items = self.items.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.slots.close();
        self.ready.notify_waiters();
        debug!("Job queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current number of buffered jobs
    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
