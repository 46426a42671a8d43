//! Request and response bodies.

use exposure_core::{
    Direction, DirectionExposure, ExposureCategory, ExposureReport, Location, MapPoint,
    RasterCrs, RasterMetadata, Roughness, SampleRecord,
};
use serde::{Deserialize, Serialize};

/// Query string of `GET /exposure`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExposureQuery {
    pub lat: f64,
    pub lon: f64,
    pub height_ft: f64,
    /// Include the individual samples of every direction.
    #[serde(default)]
    pub detail: bool,
}

impl ExposureQuery {
    pub fn location(&self) -> Location {
        Location::new(self.lat, self.lon, self.height_ft)
    }
}

#[derive(Debug, Serialize)]
pub struct ExposureResponse {
    pub location: Location,
    pub origin: MapPoint,
    pub results: Vec<DirectionResult>,
}

#[derive(Debug, Serialize)]
pub struct DirectionResult {
    pub direction: Direction,
    pub roughness: Roughness,
    pub exposure: ExposureCategory,
    pub dominant_class: Option<u16>,
    pub class_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<SampleRecord>>,
}

impl ExposureResponse {
    pub fn from_report(report: ExposureReport, detail: bool) -> Self {
        Self {
            location: report.location,
            origin: report.origin,
            results: report
                .results
                .into_iter()
                .map(|r| DirectionResult::new(r, detail))
                .collect(),
        }
    }
}

impl DirectionResult {
    fn new(d: DirectionExposure, detail: bool) -> Self {
        Self {
            direction: d.direction,
            roughness: d.roughness,
            exposure: d.exposure,
            dominant_class: d.dominant_class,
            class_name: d.class_name,
            samples: detail.then(|| d.samples.into_vec()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub raster: RasterInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RasterInfo {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// `None` for user-defined grids.
    pub epsg: Option<u16>,
    pub nodata: Option<u16>,
}

impl RasterInfo {
    pub fn new(source: &str, md: &RasterMetadata) -> Self {
        Self {
            source: source.to_string(),
            width: md.width(),
            height: md.height(),
            tile_width: md.layout.tile_width,
            tile_height: md.layout.tile_height,
            epsg: match md.crs {
                RasterCrs::Epsg { code } => Some(code),
                _ => None,
            },
            nodata: md.nodata,
        }
    }
}
