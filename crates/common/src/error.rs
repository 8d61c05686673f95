//! Common error types for CocoServe
//!
//! This module defines the error taxonomy shared by the dispatch core and the
//! HTTP front end. Startup errors are fatal; everything raised while running a
//! single job stays contained to that job.

use thiserror::Error;

/// Main error type for CocoServe
#[derive(Error, Debug)]
pub enum CocoError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model file missing, corrupt, or rejected by the engine at load time
    #[error("Model error: {0}")]
    Model(String),

    /// Label file unreadable
    #[error("Label error: {0}")]
    Labels(String),

    /// Queue full (rejection policy)
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// Dispatcher no longer admits jobs
    #[error("Shutting down: {0}")]
    ShuttingDown(String),

    /// Image retrieval failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Image bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Engine call failed or produced malformed output
    #[error("Inference error: {0}")]
    Inference(String),

    /// Annotated image could not be re-encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Job exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Response sink was gone when the result was delivered
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for CocoError {
    fn from(err: config::ConfigError) -> Self {
        CocoError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for CocoError {
    fn from(err: serde_yaml::Error) -> Self {
        CocoError::Config(err.to_string())
    }
}

impl CocoError {
    /// Stable machine-readable code for responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            CocoError::Config(_) => "CONFIG_ERROR",
            CocoError::Model(_) => "MODEL_ERROR",
            CocoError::Labels(_) => "LABEL_ERROR",
            CocoError::QueueFull(_) => "QUEUE_FULL",
            CocoError::ShuttingDown(_) => "SHUTTING_DOWN",
            CocoError::Fetch(_) => "FETCH_FAILED",
            CocoError::Decode(_) => "DECODE_FAILED",
            CocoError::Inference(_) => "INFERENCE_FAILED",
            CocoError::Encode(_) => "ENCODE_FAILED",
            CocoError::Timeout(_) => "TIMEOUT",
            CocoError::Delivery(_) => "DELIVERY_FAILED",
            CocoError::Io(_) => "IO_ERROR",
            CocoError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error belongs to a single job and must not escape it
    pub fn is_per_job(&self) -> bool {
        matches!(
            self,
            CocoError::Fetch(_)
                | CocoError::Decode(_)
                | CocoError::Inference(_)
                | CocoError::Encode(_)
                | CocoError::Timeout(_)
                | CocoError::Delivery(_)
        )
    }

    /// Whether the error is an admission refusal returned by `submit`
    pub fn is_admission(&self) -> bool {
        matches!(self, CocoError::QueueFull(_) | CocoError::ShuttingDown(_))
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        CocoError::Config(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        CocoError::Model(msg.into())
    }

    /// Create a label error
    pub fn labels(msg: impl Into<String>) -> Self {
        CocoError::Labels(msg.into())
    }

    /// Create a queue full error
    pub fn queue_full(msg: impl Into<String>) -> Self {
        CocoError::QueueFull(msg.into())
    }

    /// Create a shutting down error
    pub fn shutting_down(msg: impl Into<String>) -> Self {
        CocoError::ShuttingDown(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        CocoError::Fetch(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        CocoError::Decode(msg.into())
    }

    /// Create an inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        CocoError::Inference(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        CocoError::Encode(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        CocoError::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        CocoError::Internal(msg.into())
    }
}

/// Result type alias for CocoServe operations
pub type Result<T> = std::result::Result<T, CocoError>;
