//! Raster data access for the exposure service.
//!
//! Byte sources (HTTP range requests, local files), a GeoTIFF decoder on top
//! of them, an in-memory raster, and a concurrent tile prefetcher.

pub mod codec;
pub mod file;
pub mod geotiff;
pub mod http;
pub mod memory;
pub mod prefetcher;
pub mod tiff;

use async_trait::async_trait;
use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::{RasterMetadata, Tile, TileIndex};
use std::sync::Arc;
use std::time::Duration;

pub use file::FileSource;
pub use geotiff::GeoTiffRaster;
pub use http::HttpRangeSource;
pub use memory::MemoryRaster;
pub use prefetcher::Prefetcher;

/// NLCD 2021 land cover, conterminous US, as a cloud-optimized GeoTIFF.
pub const NLCD_2021_URL: &str =
    "https://s3-us-west-2.amazonaws.com/mrlc/nlcd_2021_land_cover_l48_20210604.tif";

/// Random-access bytes: a remote object or a local file.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads `len` bytes at `offset`. Short only at end of file.
    async fn read_range(&self, offset: u64, len: usize) -> ExposureResult<Vec<u8>>;

    /// Human-readable origin for logs.
    fn describe(&self) -> &str;
}

/// Abstraction for reading land-cover tiles from any backend.
#[async_trait]
pub trait RasterSource: Send + Sync {
    fn metadata(&self) -> &RasterMetadata;

    async fn read_tile(&self, index: TileIndex) -> ExposureResult<Arc<Tile>>;
}

/// Tuning for opening raster sources.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Bytes fetched speculatively when reading the TIFF header.
    pub header_bytes: usize,
    /// Decoded tiles kept in memory.
    pub tile_cache: usize,
    /// Per-request timeout for remote sources.
    pub timeout: Duration,
    /// Retries for rate-limited or failed remote reads.
    pub max_retries: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            header_bytes: 64 * 1024,
            tile_cache: 256,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Opens a GeoTIFF from a URL (`http://`, `https://`) or a filesystem path.
///
/// ```ignore
/// let raster = open_raster(NLCD_2021_URL, &SourceOptions::default()).await?;
/// ```
pub async fn open_raster(
    location: &str,
    options: &SourceOptions,
) -> ExposureResult<Arc<dyn RasterSource>> {
    if location.is_empty() {
        return Err(ExposureError::InvalidInput(
            "raster location must not be empty".into(),
        ));
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        let url = url::Url::parse(location)
            .map_err(|e| ExposureError::InvalidInput(format!("invalid raster URL {location}: {e}")))?;
        let source = HttpRangeSource::connect(url, options).await?;
        Ok(Arc::new(GeoTiffRaster::open(source, options).await?))
    } else {
        let source = FileSource::open(location).await?;
        Ok(Arc::new(GeoTiffRaster::open(source, options).await?))
    }
}
