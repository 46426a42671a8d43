//! Raster geometry: affine georeferencing, tile layout, decoded tiles.

use crate::error::{ExposureError, ExposureResult};
use crate::geodesy::{AlbersEqualArea, AlbersParams};
use crate::types::MapPoint;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Georeferencing
// ---------------------------------------------------------------------------

/// Affine pixel <-> map transform, GDAL coefficient order:
///
/// ```text
/// x = c[0] + col * c[1] + row * c[2]
/// y = c[3] + col * c[4] + row * c[5]
/// ```
///
/// `(col, row)` refers to the upper-left corner of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoTransform {
    coeffs: [f64; 6],
    #[serde(skip)]
    inv: [f64; 6],
}

impl GeoTransform {
    pub fn from_gdal(coeffs: [f64; 6]) -> ExposureResult<Self> {
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ExposureError::Format(format!(
                "non-finite geotransform {coeffs:?}"
            )));
        }
        let det = coeffs[1] * coeffs[5] - coeffs[2] * coeffs[4];
        if det.abs() < f64::EPSILON {
            return Err(ExposureError::Format(format!(
                "degenerate geotransform {coeffs:?}"
            )));
        }
        let inv = [
            (coeffs[2] * coeffs[3] - coeffs[0] * coeffs[5]) / det,
            coeffs[5] / det,
            -coeffs[2] / det,
            (coeffs[0] * coeffs[4] - coeffs[1] * coeffs[3]) / det,
            -coeffs[4] / det,
            coeffs[1] / det,
        ];
        Ok(Self { coeffs, inv })
    }

    /// North-up transform: origin is the upper-left corner, `pixel_height`
    /// is the (positive) ground size of a row.
    pub fn north_up(
        origin_x: f64,
        origin_y: f64,
        pixel_width: f64,
        pixel_height: f64,
    ) -> ExposureResult<Self> {
        Self::from_gdal([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height])
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.coeffs
    }

    /// Map coordinates of the upper-left corner of `(row, col)`.
    pub fn point_of(&self, row: f64, col: f64) -> MapPoint {
        let c = &self.coeffs;
        MapPoint {
            x: c[0] + col * c[1] + row * c[2],
            y: c[3] + col * c[4] + row * c[5],
        }
    }

    /// Fractional `(row, col)` of a map point.
    pub fn fractional_pixel(&self, point: MapPoint) -> (f64, f64) {
        let i = &self.inv;
        let col = i[0] + point.x * i[1] + point.y * i[2];
        let row = i[3] + point.x * i[4] + point.y * i[5];
        (row, col)
    }

    /// Integer `(row, col)` containing the point, flooring like
    /// `rasterio.DatasetReader.index`. May be negative or past the edge.
    pub fn pixel_of(&self, point: MapPoint) -> (i64, i64) {
        let (row, col) = self.fractional_pixel(point);
        (row.floor() as i64, col.floor() as i64)
    }
}

// ---------------------------------------------------------------------------
// Pixel and tile addressing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelIndex {
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileIndex {
    pub row: u32,
    pub col: u32,
}

/// How an image is cut into tiles. Strips are tiles as wide as the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileLayout {
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl TileLayout {
    pub fn new(
        image_width: u32,
        image_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> ExposureResult<Self> {
        if image_width == 0 || image_height == 0 || tile_width == 0 || tile_height == 0 {
            return Err(ExposureError::Format(format!(
                "empty layout {image_width}x{image_height} tiles {tile_width}x{tile_height}"
            )));
        }
        Ok(Self {
            image_width,
            image_height,
            tile_width,
            tile_height,
        })
    }

    pub fn tiles_across(&self) -> u32 {
        self.image_width.div_ceil(self.tile_width)
    }

    pub fn tiles_down(&self) -> u32 {
        self.image_height.div_ceil(self.tile_height)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_across() as usize * self.tiles_down() as usize
    }

    /// Row-major position of a tile, the order of TIFF offset arrays.
    pub fn linear(&self, tile: TileIndex) -> usize {
        tile.row as usize * self.tiles_across() as usize + tile.col as usize
    }

    pub fn contains_tile(&self, tile: TileIndex) -> bool {
        tile.row < self.tiles_down() && tile.col < self.tiles_across()
    }

    /// Tile holding a pixel, and the pixel's `(row, col)` inside it.
    pub fn locate(&self, pixel: PixelIndex) -> (TileIndex, u32, u32) {
        (
            TileIndex {
                row: pixel.row / self.tile_height,
                col: pixel.col / self.tile_width,
            },
            pixel.row % self.tile_height,
            pixel.col % self.tile_width,
        )
    }

    /// Number of image rows actually covered by a tile row. Only differs
    /// from `tile_height` for the last strip of a stripped image.
    pub fn rows_in(&self, tile: TileIndex) -> u32 {
        let start = tile.row * self.tile_height;
        self.tile_height.min(self.image_height.saturating_sub(start))
    }
}

// ---------------------------------------------------------------------------
// Decoded data
// ---------------------------------------------------------------------------

/// One decoded tile. `width` is the stored (padded) tile width.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub index: TileIndex,
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u16>,
}

impl Tile {
    #[inline]
    pub fn get(&self, row: u32, col: u32) -> Option<u16> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.samples
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }
}

/// Coordinate reference system declared by a raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RasterCrs {
    Epsg { code: u16 },
    /// User-defined Albers equal-area grid.
    Albers(AlbersParams),
    Unspecified,
}

/// NAD83 / Conus Albers.
pub const EPSG_CONUS_ALBERS: u16 = 5070;

impl RasterCrs {
    /// Projection from WGS84 degrees into this CRS. An unspecified CRS is
    /// taken to be CONUS Albers.
    pub fn projection(&self) -> ExposureResult<AlbersEqualArea> {
        match *self {
            RasterCrs::Epsg {
                code: EPSG_CONUS_ALBERS,
            }
            | RasterCrs::Unspecified => Ok(AlbersEqualArea::conus()),
            RasterCrs::Albers(params) => Ok(AlbersEqualArea::from_params(params)),
            RasterCrs::Epsg { code } => Err(ExposureError::Format(format!(
                "unsupported CRS EPSG:{code}; only Albers equal-area grids are supported"
            ))),
        }
    }
}

/// Everything known about a raster before reading pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RasterMetadata {
    pub layout: TileLayout,
    pub transform: GeoTransform,
    pub nodata: Option<u16>,
    pub crs: RasterCrs,
}

impl RasterMetadata {
    pub fn width(&self) -> u32 {
        self.layout.image_width
    }

    pub fn height(&self) -> u32 {
        self.layout.image_height
    }

    /// Pixel containing the point, or `None` outside the raster.
    pub fn pixel_at(&self, point: MapPoint) -> Option<PixelIndex> {
        let (row, col) = self.transform.pixel_of(point);
        if row < 0 || col < 0 || row >= i64::from(self.height()) || col >= i64::from(self.width())
        {
            return None;
        }
        Some(PixelIndex {
            row: row as u32,
            col: col as u32,
        })
    }
}

/// Tiles fetched ahead of classification. Clone-able, network-free.
#[derive(Debug, Clone)]
pub struct TileSet {
    layout: TileLayout,
    tiles: HashMap<TileIndex, Arc<Tile>>,
}

impl TileSet {
    pub fn new(layout: TileLayout) -> Self {
        Self {
            layout,
            tiles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, tile: Arc<Tile>) {
        self.tiles.insert(tile.index, tile);
    }

    pub fn get(&self, index: &TileIndex) -> Option<&Arc<Tile>> {
        self.tiles.get(index)
    }

    /// Sample value at a pixel, if its tile has been fetched.
    pub fn pixel(&self, pixel: PixelIndex) -> Option<u16> {
        let (tile, row, col) = self.layout.locate(pixel);
        self.tiles.get(&tile)?.get(row, col)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> RasterMetadata {
        RasterMetadata {
            layout: TileLayout::new(100, 50, 16, 16).unwrap(),
            transform: GeoTransform::north_up(1_000.0, 5_000.0, 30.0, 30.0).unwrap(),
            nodata: None,
            crs: RasterCrs::Epsg { code: 5070 },
        }
    }

    #[test]
    fn pixel_lookup_floors_like_rasterio() {
        let md = metadata();
        assert_eq!(
            md.pixel_at(MapPoint::new(1_000.5, 4_999.5)),
            Some(PixelIndex { row: 0, col: 0 })
        );
        assert_eq!(
            md.pixel_at(MapPoint::new(1_059.9, 4_940.1)),
            Some(PixelIndex { row: 1, col: 1 })
        );
        assert_eq!(
            md.pixel_at(MapPoint::new(1_060.5, 4_939.5)),
            Some(PixelIndex { row: 2, col: 2 })
        );
    }

    #[test]
    fn pixel_lookup_rejects_points_off_the_raster() {
        let md = metadata();
        assert_eq!(md.pixel_at(MapPoint::new(999.0, 4_990.0)), None);
        assert_eq!(md.pixel_at(MapPoint::new(1_010.0, 5_001.0)), None);
        assert_eq!(md.pixel_at(MapPoint::new(4_005.0, 4_990.0)), None);
        assert_eq!(md.pixel_at(MapPoint::new(1_010.0, 3_495.0)), None);
    }

    #[test]
    fn inverse_transform_round_trips_corners() {
        let gt = GeoTransform::from_gdal([500.0, 10.0, 2.0, 900.0, 1.0, -10.0]).unwrap();
        let p = gt.point_of(7.0, 3.0);
        let (row, col) = gt.fractional_pixel(p);
        assert!((row - 7.0).abs() < 1e-9);
        assert!((col - 3.0).abs() < 1e-9);
    }

    #[test]
    fn crs_resolves_to_albers_projection() {
        assert!(RasterCrs::Epsg { code: 5070 }.projection().is_ok());
        assert!(RasterCrs::Unspecified.projection().is_ok());
        assert!(RasterCrs::Epsg { code: 4326 }.projection().is_err());

        let custom = RasterCrs::Albers(AlbersParams::CONUS).projection().unwrap();
        let conus = AlbersEqualArea::conus();
        let (a, b) = (custom.forward(-80.0, 40.0), conus.forward(-80.0, 40.0));
        assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
    }

    #[test]
    fn degenerate_transform_is_rejected() {
        assert!(GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn layout_locates_pixels_in_edge_tiles() {
        let layout = TileLayout::new(100, 50, 16, 16).unwrap();
        assert_eq!(layout.tiles_across(), 7);
        assert_eq!(layout.tiles_down(), 4);
        let (tile, r, c) = layout.locate(PixelIndex { row: 49, col: 99 });
        assert_eq!(tile, TileIndex { row: 3, col: 6 });
        assert_eq!((r, c), (1, 3));
        assert_eq!(layout.linear(tile), 27);
        assert_eq!(layout.rows_in(tile), 2);
    }

    #[test]
    fn tile_set_reads_through_to_tiles() {
        let layout = TileLayout::new(4, 4, 2, 2).unwrap();
        let mut set = TileSet::new(layout);
        set.insert(Arc::new(Tile {
            index: TileIndex { row: 1, col: 0 },
            width: 2,
            height: 2,
            samples: vec![1, 2, 3, 4],
        }));
        assert_eq!(set.pixel(PixelIndex { row: 3, col: 1 }), Some(4));
        assert_eq!(set.pixel(PixelIndex { row: 0, col: 0 }), None);
    }
}
