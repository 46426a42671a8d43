//! Domain models, projection math, land-cover legend, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod error;
pub mod geodesy;
pub mod nlcd;
pub mod raster;
pub mod types;

pub use error::{ExposureError, ExposureResult};
pub use geodesy::{destination_point, AlbersEqualArea, AlbersParams};
pub use raster::{
    GeoTransform, PixelIndex, RasterCrs, RasterMetadata, Tile, TileIndex, TileLayout, TileSet,
};
pub use types::{
    Direction, DirectionExposure, ExposureCategory, ExposureReport, Location, MapPoint,
    Roughness, SampleRecord, SAMPLE_DISTANCES_M,
};
