//! GeoTIFF-backed raster source.
//!
//! Opens the first image of a (cloud-optimized) GeoTIFF over any
//! [`ByteSource`], derives the georeferencing from the GeoTIFF tags, and
//! serves decoded tiles through a small LRU cache.

use crate::codec::{Compression, Predictor, TileCodec};
use crate::tiff::{self, tag, Directory};
use crate::{ByteSource, RasterSource, SourceOptions};
use async_trait::async_trait;
use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::geodesy::AlbersParams;
use exposure_core::raster::EPSG_CONUS_ALBERS;
use exposure_core::{GeoTransform, RasterCrs, RasterMetadata, Tile, TileIndex, TileLayout};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

// GeoKey ids (GeoTIFF 1.1, section 7).
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const PROJ_COORD_TRANS: u16 = 3075;
const PROJ_STD_PARALLEL_1: u16 = 3078;
const PROJ_STD_PARALLEL_2: u16 = 3079;
const PROJ_NAT_ORIGIN_LONG: u16 = 3080;
const PROJ_NAT_ORIGIN_LAT: u16 = 3081;
const PROJ_FALSE_EASTING: u16 = 3082;
const PROJ_FALSE_NORTHING: u16 = 3083;
const PROJ_FALSE_ORIGIN_LONG: u16 = 3084;
const PROJ_FALSE_ORIGIN_LAT: u16 = 3085;
const PROJ_FALSE_ORIGIN_EASTING: u16 = 3086;
const PROJ_FALSE_ORIGIN_NORTHING: u16 = 3087;
const PROJ_CENTER_LONG: u16 = 3088;

const MODEL_PROJECTED: u64 = 1;
const MODEL_GEOGRAPHIC: u64 = 2;
const RASTER_PIXEL_IS_POINT: u64 = 2;
const USER_DEFINED: u64 = 32767;
const CT_ALBERS_EQUAL_AREA: u64 = 11;

/// Raster served from a GeoTIFF.
pub struct GeoTiffRaster<B> {
    source: B,
    metadata: RasterMetadata,
    codec: TileCodec,
    stripped: bool,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    cache: Mutex<LruCache<TileIndex, Arc<Tile>>>,
}

impl<B: ByteSource> GeoTiffRaster<B> {
    /// Reads the header and directory and validates the layout.
    pub async fn open(source: B, options: &SourceOptions) -> ExposureResult<Self> {
        let (header, dir) = tiff::read_directory(&source, options.header_bytes).await?;

        let width = dir.require(tag::IMAGE_WIDTH, "ImageWidth")?;
        let height = dir.require(tag::IMAGE_LENGTH, "ImageLength")?;
        let samples_per_pixel = dir.unsigned(tag::SAMPLES_PER_PIXEL).unwrap_or(1);
        if samples_per_pixel != 1 {
            return Err(ExposureError::Format(format!(
                "expected a single-band raster, found {samples_per_pixel} samples per pixel"
            )));
        }
        if dir.unsigned(tag::PLANAR_CONFIGURATION).unwrap_or(1) != 1 {
            return Err(ExposureError::Format("planar configuration 2 is not supported".into()));
        }
        let sample_format = dir.unsigned(tag::SAMPLE_FORMAT).unwrap_or(1);
        if sample_format != 1 {
            return Err(ExposureError::Format(format!(
                "only unsigned integer samples are supported, found sample format {sample_format}"
            )));
        }
        let bits = dir.unsigned(tag::BITS_PER_SAMPLE).unwrap_or(1);
        if bits != 8 && bits != 16 {
            return Err(ExposureError::Format(format!(
                "only 8- and 16-bit samples are supported, found {bits}"
            )));
        }

        let codec = TileCodec {
            compression: Compression::from_tag(dir.unsigned(tag::COMPRESSION).unwrap_or(1))?,
            predictor: Predictor::from_tag(dir.unsigned(tag::PREDICTOR).unwrap_or(1))?,
            bits_per_sample: bits as u16,
            order: header.order,
        };

        let stripped = dir.get(tag::TILE_OFFSETS).is_none();
        let (layout, offsets, byte_counts) = chunk_layout(&dir, to_u32(width)?, to_u32(height)?)?;
        let (transform, crs) = georeference(&dir)?;
        let nodata = dir.ascii(tag::GDAL_NODATA).and_then(parse_nodata);

        let metadata = RasterMetadata {
            layout,
            transform,
            nodata,
            crs,
        };

        // Rejects CRSs we cannot project into.
        crs.projection()?;
        if crs == RasterCrs::Unspecified {
            tracing::warn!(
                source = source.describe(),
                "raster has no CRS; assuming EPSG:{EPSG_CONUS_ALBERS}"
            );
        }

        tracing::info!(
            source = source.describe(),
            width,
            height,
            tile_width = layout.tile_width,
            tile_height = layout.tile_height,
            tiles = layout.tile_count(),
            compression = ?codec.compression,
            nodata = ?nodata,
            "opened GeoTIFF"
        );

        let capacity = NonZeroUsize::new(options.tile_cache).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            source,
            metadata,
            codec,
            stripped,
            offsets,
            byte_counts,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn cached(&self, index: &TileIndex) -> Option<Arc<Tile>> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(index).cloned()
    }

    fn remember(&self, tile: Arc<Tile>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(tile.index, tile);
        }
    }
}

#[async_trait]
impl<B: ByteSource + 'static> RasterSource for GeoTiffRaster<B> {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    async fn read_tile(&self, index: TileIndex) -> ExposureResult<Arc<Tile>> {
        let layout = self.metadata.layout;
        if !layout.contains_tile(index) {
            return Err(ExposureError::InvalidInput(format!(
                "tile {index:?} outside {}x{} grid",
                layout.tiles_across(),
                layout.tiles_down()
            )));
        }
        if let Some(tile) = self.cached(&index) {
            return Ok(tile);
        }

        let slot = layout.linear(index);
        let (offset, len) = (self.offsets[slot], self.byte_counts[slot]);
        let width = layout.tile_width;
        // Tiles are always stored padded; only the last strip is short.
        let rows = if self.stripped {
            layout.rows_in(index)
        } else {
            layout.tile_height
        };

        let tile = if len == 0 {
            // Sparse tile: never written, reads as nodata.
            Tile {
                index,
                width,
                height: rows,
                samples: vec![self.metadata.nodata.unwrap_or(0); width as usize * rows as usize],
            }
        } else {
            let bytes = self.source.read_range(offset, len as usize).await?;
            let codec = self.codec;
            let samples = tokio::task::spawn_blocking(move || {
                codec.decode(&bytes, width as usize, rows as usize)
            })
            .await
            .map_err(|e| ExposureError::Internal(format!("tile decode task failed: {e}")))??;
            Tile {
                index,
                width,
                height: rows,
                samples,
            }
        };

        tracing::debug!(row = index.row, col = index.col, bytes = len, "decoded tile");
        let tile = Arc::new(tile);
        self.remember(tile.clone());
        Ok(tile)
    }
}

fn to_u32(v: u64) -> ExposureResult<u32> {
    u32::try_from(v).map_err(|_| ExposureError::Format(format!("dimension {v} too large")))
}

/// Tile grid plus per-chunk offsets, for tiled or stripped images.
fn chunk_layout(
    dir: &Directory,
    width: u32,
    height: u32,
) -> ExposureResult<(TileLayout, Vec<u64>, Vec<u64>)> {
    let (layout, offsets, counts) = if dir.get(tag::TILE_OFFSETS).is_some() {
        let layout = TileLayout::new(
            width,
            height,
            to_u32(dir.require(tag::TILE_WIDTH, "TileWidth")?)?,
            to_u32(dir.require(tag::TILE_LENGTH, "TileLength")?)?,
        )?;
        (
            layout,
            dir.unsigned_array(tag::TILE_OFFSETS),
            dir.unsigned_array(tag::TILE_BYTE_COUNTS),
        )
    } else {
        let rows_per_strip = dir
            .unsigned(tag::ROWS_PER_STRIP)
            .unwrap_or(u64::from(height))
            .min(u64::from(height));
        let layout = TileLayout::new(width, height, width, to_u32(rows_per_strip)?)?;
        (
            layout,
            dir.unsigned_array(tag::STRIP_OFFSETS),
            dir.unsigned_array(tag::STRIP_BYTE_COUNTS),
        )
    };

    let offsets = offsets.ok_or_else(|| ExposureError::Format("missing chunk offsets".into()))?;
    let counts = counts.ok_or_else(|| ExposureError::Format("missing chunk byte counts".into()))?;
    if offsets.len() < layout.tile_count() || counts.len() < layout.tile_count() {
        return Err(ExposureError::Format(format!(
            "expected {} chunks, found {} offsets and {} byte counts",
            layout.tile_count(),
            offsets.len(),
            counts.len()
        )));
    }
    Ok((layout, offsets.to_vec(), counts.to_vec()))
}

/// Affine transform and CRS from the GeoTIFF tags.
fn georeference(dir: &Directory) -> ExposureResult<(GeoTransform, RasterCrs)> {
    let keys = GeoKeys::parse(dir);

    let mut gt = if let Some(m) = dir.float_array(tag::MODEL_TRANSFORMATION) {
        if m.len() < 16 {
            return Err(ExposureError::Format("short ModelTransformation tag".into()));
        }
        [m[3], m[0], m[1], m[7], m[4], m[5]]
    } else {
        let tiepoint = dir.float_array(tag::MODEL_TIEPOINT);
        let scale = dir.float_array(tag::MODEL_PIXEL_SCALE);
        match (tiepoint, scale) {
            (Some(tp), Some(sc)) if tp.len() >= 6 && sc.len() >= 2 => {
                let (i, j, x, y) = (tp[0], tp[1], tp[3], tp[4]);
                [x - i * sc[0], sc[0], 0.0, y + j * sc[1], 0.0, -sc[1]]
            }
            _ => {
                return Err(ExposureError::Format(
                    "raster is not georeferenced (no tiepoint/scale or transformation)".into(),
                ))
            }
        }
    };

    // PixelIsPoint rasters reference pixel centres; shift to corners.
    if keys.short(GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        gt[0] -= 0.5 * (gt[1] + gt[2]);
        gt[3] -= 0.5 * (gt[4] + gt[5]);
    }

    Ok((GeoTransform::from_gdal(gt)?, keys.crs()?))
}

/// Decoded GeoKeyDirectory.
#[derive(Default)]
struct GeoKeys {
    shorts: Vec<(u16, u64)>,
    doubles: Vec<(u16, f64)>,
}

impl GeoKeys {
    fn parse(dir: &Directory) -> Self {
        let mut keys = GeoKeys::default();
        let Some(d) = dir.unsigned_array(tag::GEO_KEY_DIRECTORY) else {
            return keys;
        };
        if d.len() < 4 {
            return keys;
        }
        let params = dir.float_array(tag::GEO_DOUBLE_PARAMS).unwrap_or(&[]);
        let count = d[3] as usize;
        for entry in d[4..].chunks_exact(4).take(count) {
            let (key, location, value) = (entry[0] as u16, entry[1] as u16, entry[3]);
            match location {
                0 => keys.shorts.push((key, value)),
                tag::GEO_DOUBLE_PARAMS => {
                    if let Some(v) = params.get(value as usize) {
                        keys.doubles.push((key, *v));
                    }
                }
                _ => {}
            }
        }
        keys
    }

    fn short(&self, key: u16) -> Option<u64> {
        self.shorts.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn double(&self, key: u16) -> Option<f64> {
        self.doubles.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn first_double(&self, keys: &[u16]) -> Option<f64> {
        keys.iter().find_map(|k| self.double(*k))
    }

    /// CRS declared by the keys. Only a directory with neither a model
    /// type nor any CRS key is unspecified; anything declared but not
    /// representable is a format error.
    fn crs(&self) -> ExposureResult<RasterCrs> {
        let model = self.short(GT_MODEL_TYPE);
        let projected = self.short(PROJECTED_CS_TYPE);
        let transform = self.short(PROJ_COORD_TRANS);
        let geographic = self.short(GEOGRAPHIC_TYPE);

        match projected {
            Some(USER_DEFINED) => return self.user_defined_albers(),
            Some(code) => {
                return u16::try_from(code)
                    .map(|code| RasterCrs::Epsg { code })
                    .map_err(|_| ExposureError::Format(format!("invalid ProjectedCSType {code}")));
            }
            None => {}
        }

        let unsupported_geographic = || {
            let code = geographic.map_or_else(|| "unknown".to_string(), |c| c.to_string());
            ExposureError::Format(format!(
                "geographic CRS (EPSG:{code}) is not supported; expected a projected Albers grid"
            ))
        };

        match model {
            Some(MODEL_GEOGRAPHIC) => Err(unsupported_geographic()),
            Some(MODEL_PROJECTED) => self.user_defined_albers(),
            Some(other) => Err(ExposureError::Format(format!(
                "unsupported GeoTIFF model type {other}"
            ))),
            None if transform.is_some() => self.user_defined_albers(),
            None if geographic.is_some() => Err(unsupported_geographic()),
            None => Ok(RasterCrs::Unspecified),
        }
    }

    /// Albers equal-area parameters from a user-defined projection.
    fn user_defined_albers(&self) -> ExposureResult<RasterCrs> {
        match self.short(PROJ_COORD_TRANS) {
            Some(CT_ALBERS_EQUAL_AREA) => {}
            Some(other) => {
                return Err(ExposureError::Format(format!(
                    "user-defined projection with coordinate transformation {other} is not supported; only Albers equal-area ({CT_ALBERS_EQUAL_AREA})"
                )))
            }
            None => {
                return Err(ExposureError::Format(
                    "user-defined projection without ProjCoordTransGeoKey".into(),
                ))
            }
        }

        let missing = |name: &str| {
            ExposureError::Format(format!("user-defined Albers projection is missing {name}"))
        };
        let params = AlbersParams {
            lat1: self
                .double(PROJ_STD_PARALLEL_1)
                .ok_or_else(|| missing("ProjStdParallel1"))?,
            lat2: self
                .double(PROJ_STD_PARALLEL_2)
                .ok_or_else(|| missing("ProjStdParallel2"))?,
            lat0: self
                .first_double(&[PROJ_FALSE_ORIGIN_LAT, PROJ_NAT_ORIGIN_LAT])
                .ok_or_else(|| missing("the latitude of origin"))?,
            lon0: self
                .first_double(&[PROJ_FALSE_ORIGIN_LONG, PROJ_NAT_ORIGIN_LONG, PROJ_CENTER_LONG])
                .ok_or_else(|| missing("the longitude of origin"))?,
            false_easting: self
                .first_double(&[PROJ_FALSE_ORIGIN_EASTING, PROJ_FALSE_EASTING])
                .unwrap_or(0.0),
            false_northing: self
                .first_double(&[PROJ_FALSE_ORIGIN_NORTHING, PROJ_FALSE_NORTHING])
                .unwrap_or(0.0),
        };
        Ok(RasterCrs::Albers(params))
    }
}

/// GDAL writes nodata as ASCII. Only integral values a sample can hold
/// are meaningful here.
fn parse_nodata(text: &str) -> Option<u16> {
    let v: f64 = text.trim().parse().ok()?;
    if v.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&v) {
        Some(v as u16)
    } else {
        None
    }
}
