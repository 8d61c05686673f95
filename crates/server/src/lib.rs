//! CocoServe HTTP front end
//!
//! Accepts classification requests, hands them to the worker crate's
//! dispatcher and streams back the annotated JPEG.

pub mod error;
pub mod router;
pub mod routes;
pub mod state;

pub use error::{AppError, AppResult};
pub use router::build_app_router;
pub use state::AppState;
