//! Shared application state.

use exposure_analyzer::ExposureEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: ExposureEngine,
    /// Where the raster was opened from, for `/health`.
    pub raster: Arc<str>,
    pub request_timeout: Duration,
    pub started: Instant,
}

impl AppState {
    pub fn new(engine: ExposureEngine, raster: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            raster: raster.into(),
            request_timeout: Duration::from_secs(30),
            started: Instant::now(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
