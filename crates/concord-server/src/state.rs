use std::sync::Arc;

use concord_core::config::RequestingConfig;
use concord_core::{Engine, Requesting};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub requesting: Arc<Requesting>,
    pub config: Arc<RequestingConfig>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, requesting: Arc<Requesting>, config: RequestingConfig) -> Self {
        Self {
            engine,
            requesting,
            config: Arc::new(config),
        }
    }

    /// Base path without a trailing slash; empty when mounted at the root.
    pub fn base_path(&self) -> &str {
        self.config.base_path.trim_end_matches('/')
    }
}
