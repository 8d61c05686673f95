use std::sync::Arc;

use cocoserve_common::ServeConfig;
use cocoserve_worker::{Classifier, Dispatcher};

/// Shared application state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Job dispatcher; every classification goes through `submit`.
    pub dispatcher: Arc<Dispatcher>,
    /// Shared classifier attached to each payload.
    pub classifier: Arc<Classifier>,
    pub config: Arc<ServeConfig>,
}
