//! Exposure engine: plan -> prefetch -> assess.
//!
//! Network I/O happens only in the prefetch step. Classification runs on
//! the blocking pool, in parallel across sites for batches.

use crate::assess::assess;
use crate::plan::SamplePlan;
use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::{AlbersEqualArea, ExposureReport, Location, RasterMetadata};
use exposure_provider::{Prefetcher, RasterSource};
use std::sync::Arc;
use std::time::Instant;

/// Assesses sites against one land-cover raster. Cheap to clone.
#[derive(Clone)]
pub struct ExposureEngine {
    projection: AlbersEqualArea,
    prefetcher: Prefetcher,
}

impl ExposureEngine {
    /// Fails when the raster's CRS cannot be projected into.
    pub fn new(source: Arc<dyn RasterSource>) -> ExposureResult<Self> {
        let projection = source.metadata().crs.projection()?;
        Ok(Self {
            projection,
            prefetcher: Prefetcher::new(source),
        })
    }

    /// Override max concurrent tile reads per request.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.prefetcher = self.prefetcher.with_concurrency(n);
        self
    }

    pub fn metadata(&self) -> &RasterMetadata {
        self.prefetcher.source().metadata()
    }

    pub fn plan(&self, location: Location) -> ExposureResult<SamplePlan> {
        SamplePlan::build(location, self.metadata(), &self.projection)
    }

    /// Full assessment of one site.
    pub async fn assess(&self, location: Location) -> ExposureResult<ExposureReport> {
        let start = Instant::now();
        let plan = self.plan(location)?;
        let tiles = self.prefetcher.prefetch(plan.pixels()).await?;
        let nodata = self.metadata().nodata;

        let report = tokio::task::spawn_blocking(move || assess(&plan, &tiles, nodata))
            .await
            .map_err(|e| ExposureError::Internal(format!("assessment task failed: {e}")))?;

        tracing::info!(
            lat = location.lat,
            lon = location.lon,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "assessed site"
        );
        Ok(report)
    }

    /// Assesses many sites, fetching the union of their tiles once.
    ///
    /// Per-site failures (invalid input, out of coverage) are returned in
    /// place; a tile fetch failure fails the whole batch.
    pub async fn assess_batch(
        &self,
        locations: &[Location],
    ) -> ExposureResult<Vec<ExposureResult<ExposureReport>>> {
        use rayon::prelude::*;

        let start = Instant::now();
        let plans: Vec<ExposureResult<SamplePlan>> =
            locations.iter().map(|&l| self.plan(l)).collect();

        let pixels: Vec<_> = plans
            .iter()
            .filter_map(|p| p.as_ref().ok())
            .flat_map(|p| p.pixels())
            .collect();
        let tiles = self.prefetcher.prefetch(pixels).await?;
        let nodata = self.metadata().nodata;

        tracing::info!(sites = locations.len(), tiles = tiles.len(), "parallel assessment");

        let reports = tokio::task::spawn_blocking(move || {
            plans
                .into_par_iter()
                .map(|plan| plan.map(|p| assess(&p, &tiles, nodata)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ExposureError::Internal(format!("batch assessment task failed: {e}")))?;

        tracing::info!(
            sites = reports.len(),
            failed = reports.iter().filter(|r| r.is_err()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch complete"
        );
        Ok(reports)
    }
}
