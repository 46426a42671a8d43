//! Domain types for the wind exposure service.

use crate::error::{ExposureError, ExposureResult};
use crate::raster::PixelIndex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Upwind sampling distances in metres, nearest first.
pub const SAMPLE_DISTANCES_M: [f64; 4] = [300.0, 600.0, 1200.0, 2500.0];

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A site to assess: WGS84 degrees plus structure height in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub height_ft: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64, height_ft: f64) -> Self {
        Self { lat, lon, height_ft }
    }

    pub fn validate(&self) -> ExposureResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ExposureError::InvalidInput(format!(
                "lat must be within [-90, 90], got {}",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(ExposureError::InvalidInput(format!(
                "lon must be within [-180, 180], got {}",
                self.lon
            )));
        }
        if !self.height_ft.is_finite() || self.height_ft < 0.0 {
            return Err(ExposureError::InvalidInput(format!(
                "height_ft must be a non-negative number, got {}",
                self.height_ft
            )));
        }
        Ok(())
    }
}

/// A point in projected map coordinates (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// The eight compass directions sampled around a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    /// Clockwise from north. Reports are always emitted in this order.
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// Bearing in degrees clockwise from grid north.
    pub const fn bearing_deg(self) -> f64 {
        match self {
            Direction::N => 0.0,
            Direction::NE => 45.0,
            Direction::E => 90.0,
            Direction::SE => 135.0,
            Direction::S => 180.0,
            Direction::SW => 225.0,
            Direction::W => 270.0,
            Direction::NW => 315.0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::E => "E",
            Direction::SE => "SE",
            Direction::S => "S",
            Direction::SW => "SW",
            Direction::W => "W",
            Direction::NW => "NW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Surface roughness category derived from land cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Roughness {
    /// Urban, suburban, wooded.
    B,
    /// Open terrain with scattered obstructions.
    C,
    /// Flat, unobstructed areas and water surfaces.
    D,
}

/// Wind exposure category assigned to a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureCategory {
    B,
    C,
    D,
}

impl fmt::Display for Roughness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Roughness::B => "B",
            Roughness::C => "C",
            Roughness::D => "D",
        })
    }
}

impl fmt::Display for ExposureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExposureCategory::B => "B",
            ExposureCategory::C => "C",
            ExposureCategory::D => "D",
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One land-cover sample along a direction.
///
/// `pixel` is `None` when the sample point falls outside the raster;
/// `class` is `None` for those and for nodata pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub distance_m: f64,
    pub point: MapPoint,
    pub pixel: Option<PixelIndex>,
    pub class: Option<u16>,
}

/// Classification for a single compass direction.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionExposure {
    pub direction: Direction,
    pub roughness: Roughness,
    pub exposure: ExposureCategory,
    pub dominant_class: Option<u16>,
    pub class_name: Option<&'static str>,
    pub samples: SmallVec<[SampleRecord; 4]>,
}

/// Full assessment for one site, `results` in [`Direction::ALL`] order.
#[derive(Debug, Clone, Serialize)]
pub struct ExposureReport {
    pub location: Location,
    pub origin: MapPoint,
    pub results: Vec<DirectionExposure>,
}

impl ExposureReport {
    pub fn direction(&self, direction: Direction) -> Option<&DirectionExposure> {
        self.results.iter().find(|r| r.direction == direction)
    }
}
