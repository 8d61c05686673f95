//! CocoServe Worker
//!
//! Bounded job dispatch for image classification: a capacity-limited job
//! queue, an idle-worker registry and a fixed worker pool running each job's
//! fetch, decode, classify, annotate and encode pipeline against a shared
//! inference engine.

pub mod annotate;
pub mod classifier;
pub mod dispatcher;
pub mod engine;
pub mod fetch;
pub mod job;
pub mod labels;
pub mod pipeline;
pub mod queue;
pub mod registry;
#[cfg(feature = "tensorflow")]
pub mod tensorflow;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{BoundingBox, Classifier, Detection};
pub use dispatcher::Dispatcher;
pub use engine::{
    load_engine, with_concurrency, EngineOutput, ImageTensor, InferenceEngine, ModelFile,
};
pub use fetch::{HttpFetcher, ImageFetcher, ImageSource};
pub use job::{ClassifiedImage, JobId, JobResult, Payload, ResponseReceiver, ResponseSink};
pub use labels::LabelTable;
pub use worker::WorkerContext;
