//! Concurrent tile prefetcher with bounded concurrency.
//!
//! Fetches every distinct tile touched by a set of pixels in parallel,
//! producing a warm [`TileSet`] that classification reads without I/O.

use crate::RasterSource;
use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::{PixelIndex, TileIndex, TileSet};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default max concurrent tile reads. Each is one ranged request.
const DEFAULT_CONCURRENCY: usize = 8;

/// Concurrent tile prefetcher.
///
/// Owns the raster source and fetches tiles via `JoinSet`, throttled by a
/// semaphore.
///
/// ```ignore
/// let prefetcher = Prefetcher::new(raster.clone());
/// let tiles = prefetcher.prefetch(plan.pixels()).await?;
/// ```
#[derive(Clone)]
pub struct Prefetcher {
    source: Arc<dyn RasterSource>,
    max_concurrent: usize,
}

impl Prefetcher {
    pub fn new(source: Arc<dyn RasterSource>) -> Self {
        Self {
            source,
            max_concurrent: DEFAULT_CONCURRENCY,
        }
    }

    /// Override max concurrent tile reads (default: 8).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn source(&self) -> &Arc<dyn RasterSource> {
        &self.source
    }

    /// Fetches the tiles covering `pixels`. Any failed tile fails the call.
    pub async fn prefetch(
        &self,
        pixels: impl IntoIterator<Item = PixelIndex>,
    ) -> ExposureResult<TileSet> {
        let layout = self.source.metadata().layout;
        let wanted: BTreeSet<TileIndex> = pixels
            .into_iter()
            .map(|p| layout.locate(p).0)
            .collect();

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_concurrent));
        tracing::debug!(
            tiles = wanted.len(),
            concurrency = self.max_concurrent,
            "prefetching tiles"
        );

        let mut tasks = tokio::task::JoinSet::new();
        for index in wanted {
            let source = self.source.clone();
            let sem = semaphore.clone();
            tasks.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| ExposureError::Internal(format!("semaphore closed: {e}")))?;
                source.read_tile(index).await
            });
        }

        let mut tiles = TileSet::new(layout);
        let mut first_error = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(tile)) => tiles.insert(tile),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "tile fetch failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "tile fetch task panicked");
                    first_error
                        .get_or_insert(ExposureError::Internal(format!("tile task failed: {e}")));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        tracing::debug!(tiles = tiles.len(), "prefetch done");
        Ok(tiles)
    }
}
