//! Test doubles shared by the unit tests of this crate

use crate::classifier::{BoundingBox, Classifier, Detection};
use crate::engine::{EngineOutput, ImageTensor, InferenceEngine};
use crate::fetch::{ImageFetcher, ImageSource};
use crate::job::{Job, Payload, ResponseReceiver, ResponseSink};
use crate::labels::LabelTable;
use async_trait::async_trait;
use cocoserve_common::{CocoError, Result};
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::{Condvar, Mutex};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn detection(class: usize, score: f32) -> Detection {
    Detection {
        bbox: BoundingBox {
            x1: 0.1,
            y1: 0.1,
            x2: 0.5,
            y2: 0.5,
        },
        class,
        score,
    }
}

/// PNG-encoded gradient of the given size
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub(crate) fn classifier_with<E: InferenceEngine + 'static>(engine: E) -> Classifier {
    Classifier::new(Box::new(engine), LabelTable::from_lines(["cat", "dog"]))
}

pub(crate) fn payload(
    source: ImageSource,
    classifier: &Arc<Classifier>,
) -> (Payload, ResponseReceiver) {
    let (sink, rx) = ResponseSink::channel();
    (Payload::new(source, sink, classifier.clone()), rx)
}

/// A job nobody waits on
pub(crate) fn test_job() -> Job {
    let classifier = Arc::new(classifier_with(FixedEngine::default()));
    let (payload, _rx) = payload(ImageSource::Bytes(Vec::new()), &classifier);
    Job::new(payload)
}

/// Poll `check` until it holds or `limit` passes
pub(crate) async fn wait_until<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Engine returning the same output for every call
#[derive(Default)]
pub(crate) struct FixedEngine {
    output: EngineOutput,
}

impl FixedEngine {
    pub(crate) fn new(output: EngineOutput) -> Self {
        Self { output }
    }
}

impl InferenceEngine for FixedEngine {
    fn run(&self, _input: &ImageTensor) -> Result<EngineOutput> {
        Ok(self.output.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

pub(crate) struct FailingEngine;

impl InferenceEngine for FailingEngine {
    fn run(&self, _input: &ImageTensor) -> Result<EngineOutput> {
        Err(CocoError::inference("graph invocation failed"))
    }
}

pub(crate) struct PanickingEngine;

impl InferenceEngine for PanickingEngine {
    fn run(&self, _input: &ImageTensor) -> Result<EngineOutput> {
        panic!("engine blew up");
    }
}

/// Shared view into a [`GatedEngine`]
#[derive(Default)]
pub(crate) struct EngineGate {
    permits: Mutex<usize>,
    opened: Condvar,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    widths: Mutex<Vec<u32>>,
}

impl EngineGate {
    /// Let `n` blocked or future calls complete
    pub(crate) fn release(&self, n: usize) {
        *self.permits.lock() += n;
        self.opened.notify_all();
    }

    /// Let every call complete from now on
    pub(crate) fn open(&self) {
        *self.permits.lock() = usize::MAX / 2;
        self.opened.notify_all();
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Input widths in call order
    pub(crate) fn widths(&self) -> Vec<u32> {
        self.widths.lock().clone()
    }
}

/// Opens the gate when dropped so a failing test never strands blocking threads
pub(crate) struct OpenOnDrop(pub(crate) Arc<EngineGate>);

impl Drop for OpenOnDrop {
    fn drop(&mut self) {
        self.0.open();
    }
}

/// Engine whose calls block until the test releases them
pub(crate) struct GatedEngine {
    gate: Arc<EngineGate>,
}

impl GatedEngine {
    pub(crate) fn new() -> (Self, Arc<EngineGate>) {
        let gate = Arc::new(EngineGate::default());
        (
            Self {
                gate: gate.clone(),
            },
            gate,
        )
    }
}

impl InferenceEngine for GatedEngine {
    fn run(&self, input: &ImageTensor) -> Result<EngineOutput> {
        let gate = &self.gate;
        gate.widths.lock().push(input.width());
        gate.started.fetch_add(1, Ordering::SeqCst);
        let active = gate.active.fetch_add(1, Ordering::SeqCst) + 1;
        gate.peak.fetch_max(active, Ordering::SeqCst);

        {
            let mut permits = gate.permits.lock();
            while *permits == 0 {
                gate.opened.wait(&mut permits);
            }
            *permits -= 1;
        }

        gate.active.fetch_sub(1, Ordering::SeqCst);
        Ok(EngineOutput::default())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Fetcher that fails every request
pub(crate) struct FailingFetcher;

#[async_trait]
impl ImageFetcher for FailingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(CocoError::fetch(format!("{} returned 404 Not Found", url)))
    }
}

/// Fetcher that never answers
pub(crate) struct HangingFetcher;

#[async_trait]
impl ImageFetcher for HangingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        std::future::pending().await
    }
}
