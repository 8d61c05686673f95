//! Payloads, jobs and the write-once response sink

use crate::classifier::Classifier;
use crate::fetch::ImageSource;
use cocoserve_common::{CocoError, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Job identifier
pub type JobId = Uuid;

/// Annotated output of a successful job
#[derive(Debug, Clone)]
pub struct ClassifiedImage {
    /// JPEG-encoded annotated image
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Label texts drawn onto the image, highest score first
    pub labels: Vec<String>,
}

/// What a job delivers to its sink
pub type JobResult = Result<ClassifiedImage>;

/// Write-once destination for a job's result
#[derive(Debug)]
pub struct ResponseSink {
    tx: oneshot::Sender<JobResult>,
}

/// Receiving end held by the request handler
pub type ResponseReceiver = oneshot::Receiver<JobResult>;

impl ResponseSink {
    /// Create a connected sink/receiver pair
    pub fn channel() -> (Self, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the result; fails when the receiver has gone away
    pub fn deliver(self, result: JobResult) -> Result<()> {
        self.tx
            .send(result)
            .map_err(|_| CocoError::Delivery("response receiver dropped".to_string()))
    }
}

/// Immutable description of one classification request
#[derive(Debug)]
pub struct Payload {
    pub(crate) source: ImageSource,
    pub(crate) sink: ResponseSink,
    pub(crate) classifier: Arc<Classifier>,
}

impl Payload {
    pub fn new(source: ImageSource, sink: ResponseSink, classifier: Arc<Classifier>) -> Self {
        Self {
            source,
            sink,
            classifier,
        }
    }
}

/// A queued unit of work, consumed exactly once by one worker
#[derive(Debug)]
pub struct Job {
    pub(crate) id: JobId,
    /// Admission order, assigned by the queue
    pub(crate) sequence: u64,
    pub(crate) enqueued_at: Instant,
    pub(crate) payload: Payload,
}

impl Job {
    pub fn new(payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            enqueued_at: Instant::now(),
            payload,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
