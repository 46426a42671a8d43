//! In-memory raster for tests, demos and benchmarks.

use crate::RasterSource;
use async_trait::async_trait;
use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::{PixelIndex, RasterMetadata, Tile, TileIndex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A fully materialized single-band raster, cut into tiles on read.
pub struct MemoryRaster {
    metadata: RasterMetadata,
    data: Vec<u16>,
    reads: AtomicUsize,
}

impl MemoryRaster {
    /// `data` is row-major, `width * height` samples.
    pub fn new(metadata: RasterMetadata, data: Vec<u16>) -> ExposureResult<Self> {
        let expected = metadata.width() as usize * metadata.height() as usize;
        if data.len() != expected {
            return Err(ExposureError::InvalidInput(format!(
                "raster data has {} samples, layout needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            metadata,
            data,
            reads: AtomicUsize::new(0),
        })
    }

    /// Builds a raster by evaluating `f` at every pixel.
    pub fn from_fn(metadata: RasterMetadata, f: impl Fn(PixelIndex) -> u16) -> Self {
        let (w, h) = (metadata.width(), metadata.height());
        let mut data = Vec::with_capacity(w as usize * h as usize);
        for row in 0..h {
            for col in 0..w {
                data.push(f(PixelIndex { row, col }));
            }
        }
        Self {
            metadata,
            data,
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of `read_tile` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RasterSource for MemoryRaster {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    async fn read_tile(&self, index: TileIndex) -> ExposureResult<Arc<Tile>> {
        let layout = self.metadata.layout;
        if !layout.contains_tile(index) {
            return Err(ExposureError::InvalidInput(format!(
                "tile {index:?} outside raster"
            )));
        }
        self.reads.fetch_add(1, Ordering::Relaxed);

        let (tw, th) = (layout.tile_width, layout.tile_height);
        let fill = self.metadata.nodata.unwrap_or(0);
        let mut samples = Vec::with_capacity(tw as usize * th as usize);
        for r in 0..th {
            let row = index.row * th + r;
            for c in 0..tw {
                let col = index.col * tw + c;
                let value = if row < layout.image_height && col < layout.image_width {
                    self.data[row as usize * layout.image_width as usize + col as usize]
                } else {
                    fill
                };
                samples.push(value);
            }
        }

        Ok(Arc::new(Tile {
            index,
            width: tw,
            height: th,
            samples,
        }))
    }
}
