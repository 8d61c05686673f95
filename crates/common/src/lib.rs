//! CocoServe common library
//!
//! Configuration, error taxonomy and metrics shared by the dispatch core and
//! the HTTP front end.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{AdmissionPolicy, EngineConcurrency, ServeConfig};
pub use error::{CocoError, Result};
pub use metrics::{MetricsRegistry, METRICS};
