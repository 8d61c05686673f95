//! TensorFlow frozen-graph backend
//!
//! Imports a COCO-style object detection graph once and runs it through a
//! single session shared by all workers. TensorFlow sessions accept concurrent
//! `Run` calls, so this engine is used under the `shared` policy by default.

use crate::engine::{EngineOutput, ImageTensor, InferenceEngine, ModelFile};
use cocoserve_common::{CocoError, Result};
use tensorflow::{
    Graph, ImportGraphDefOptions, Operation, Session, SessionOptions, SessionRunArgs, Tensor,
};
use tracing::info;

const INPUT_OP: &str = "image_tensor";
const BOXES_OP: &str = "detection_boxes";
const SCORES_OP: &str = "detection_scores";
const CLASSES_OP: &str = "detection_classes";
const COUNT_OP: &str = "num_detections";

/// Detection graph plus the session that executes it
pub struct FrozenGraphEngine {
    session: Session,
    input: Operation,
    boxes: Operation,
    scores: Operation,
    classes: Operation,
    count: Operation,
}

fn model_err(context: &str, err: tensorflow::Status) -> CocoError {
    CocoError::model(format!("{}: {}", context, err))
}

fn run_err(context: &str, err: tensorflow::Status) -> CocoError {
    CocoError::inference(format!("{}: {}", context, err))
}

impl FrozenGraphEngine {
    /// Import a serialized `GraphDef` and open a session over it
    pub fn import(model: &ModelFile) -> Result<Self> {
        let mut graph = Graph::new();
        graph
            .import_graph_def(model, &ImportGraphDefOptions::new())
            .map_err(|e| model_err("failed to import graph", e))?;

        let session = Session::new(&SessionOptions::new(), &graph)
            .map_err(|e| model_err("failed to create session", e))?;

        let op = |name: &str| {
            graph
                .operation_by_name_required(name)
                .map_err(|e| model_err(&format!("graph has no `{}` operation", name), e))
        };

        let engine = Self {
            input: op(INPUT_OP)?,
            boxes: op(BOXES_OP)?,
            scores: op(SCORES_OP)?,
            classes: op(CLASSES_OP)?,
            count: op(COUNT_OP)?,
            session,
        };

        info!(path = %model.path().display(), "Imported TensorFlow detection graph");
        Ok(engine)
    }
}

impl InferenceEngine for FrozenGraphEngine {
    fn run(&self, input: &ImageTensor) -> Result<EngineOutput> {
        let tensor = Tensor::<u8>::new(&input.shape())
            .with_values(input.data())
            .map_err(|e| run_err("failed to build input tensor", e))?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&self.input, 0, &tensor);
        let boxes_token = args.request_fetch(&self.boxes, 0);
        let scores_token = args.request_fetch(&self.scores, 0);
        let classes_token = args.request_fetch(&self.classes, 0);
        let count_token = args.request_fetch(&self.count, 0);

        self.session
            .run(&mut args)
            .map_err(|e| run_err("session run failed", e))?;

        let boxes: Tensor<f32> = args
            .fetch(boxes_token)
            .map_err(|e| run_err(BOXES_OP, e))?;
        let scores: Tensor<f32> = args
            .fetch(scores_token)
            .map_err(|e| run_err(SCORES_OP, e))?;
        let classes: Tensor<f32> = args
            .fetch(classes_token)
            .map_err(|e| run_err(CLASSES_OP, e))?;
        let count: Tensor<f32> = args
            .fetch(count_token)
            .map_err(|e| run_err(COUNT_OP, e))?;

        if boxes.len() % 4 != 0 {
            return Err(CocoError::inference(format!(
                "{} has {} values, not a multiple of 4",
                BOXES_OP,
                boxes.len()
            )));
        }

        let count = count
            .first()
            .copied()
            .ok_or_else(|| CocoError::inference(format!("{} is empty", COUNT_OP)))?;

        Ok(EngineOutput {
            boxes: boxes
                .chunks_exact(4)
                .map(|b| [b[0], b[1], b[2], b[3]])
                .collect(),
            scores: scores.to_vec(),
            classes: classes.to_vec(),
            count: count.max(0.0) as usize,
        })
    }

    fn name(&self) -> &str {
        "tensorflow"
    }
}
