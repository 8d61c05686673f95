//! Classifier adapter over the inference engine
//!
//! Wraps a loaded engine and the label table into one immutable value that is
//! built once at startup and shared by reference with every worker.

use crate::engine::{EngineOutput, ImageTensor, InferenceEngine};
use crate::labels::LabelTable;
use cocoserve_common::metrics::LatencyTimer;
use cocoserve_common::{CocoError, Result, METRICS};
use tracing::trace;

/// Box corners in normalized `[0, 1]` image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Scale to pixel coordinates of a `width` x `height` image
    pub fn to_pixels(&self, width: u32, height: u32) -> (i64, i64, i64, i64) {
        let (w, h) = (width as f32, height as f32);
        (
            (w * self.x1) as i64,
            (h * self.y1) as i64,
            (w * self.x2) as i64,
            (h * self.y2) as i64,
        )
    }
}

/// One detected object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class: usize,
    pub score: f32,
}

/// Engine plus labels, safe to share across workers
pub struct Classifier {
    engine: Box<dyn InferenceEngine>,
    labels: LabelTable,
}

impl Classifier {
    /// Create a classifier; performs no I/O
    pub fn new(engine: Box<dyn InferenceEngine>, labels: LabelTable) -> Self {
        Self { engine, labels }
    }

    /// Run the engine and return detections in engine (score-descending) order
    pub fn classify(&self, input: &ImageTensor) -> Result<Vec<Detection>> {
        let output = METRICS
            .jobs
            .inference_duration
            .time(|| self.engine.run(input))?;

        let detections = decode_output(&output)?;
        trace!(
            engine = self.engine.name(),
            detections = detections.len(),
            "Engine returned"
        );
        Ok(detections)
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("engine", &self.engine.name())
            .field("labels", &self.labels.len())
            .finish()
    }
}

/// Validate raw engine output and convert it into detections
fn decode_output(output: &EngineOutput) -> Result<Vec<Detection>> {
    let count = output.count;
    if output.boxes.len() < count || output.scores.len() < count || output.classes.len() < count {
        return Err(CocoError::inference(format!(
            "malformed output: count={} boxes={} scores={} classes={}",
            count,
            output.boxes.len(),
            output.scores.len(),
            output.classes.len()
        )));
    }

    let mut detections = Vec::with_capacity(count);
    for i in 0..count {
        let score = output.scores[i];
        let class = output.classes[i];
        if !score.is_finite() || !class.is_finite() || class < 0.0 {
            return Err(CocoError::inference(format!(
                "malformed output at {}: score={} class={}",
                i, score, class
            )));
        }

        let [ymin, xmin, ymax, xmax] = output.boxes[i];
        detections.push(Detection {
            bbox: BoundingBox {
                x1: xmin.clamp(0.0, 1.0),
                y1: ymin.clamp(0.0, 1.0),
                x2: xmax.clamp(0.0, 1.0),
                y2: ymax.clamp(0.0, 1.0),
            },
            class: class as usize,
            score: score.clamp(0.0, 1.0),
        });
    }
    Ok(detections)
}

/// Keep the leading detections scoring strictly above `threshold`
///
/// Relies on the engine's descending-score order: selection stops at the first
/// detection at or below the threshold.
pub fn select(detections: &[Detection], threshold: f32) -> &[Detection] {
    let kept = detections
        .iter()
        .take_while(|d| d.score > threshold)
        .count();
    &detections[..kept]
}
