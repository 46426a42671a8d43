//! Sample planning: where to look around a site.
//!
//! Projects the site into the raster's grid and lays out
//! [`SAMPLE_DISTANCES_M`] steps along each [`Direction`].

use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::{
    destination_point, AlbersEqualArea, Direction, Location, MapPoint, PixelIndex,
    RasterMetadata, SAMPLE_DISTANCES_M,
};

/// One planned sample point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedSample {
    pub distance_m: f64,
    pub point: MapPoint,
    /// `None` when the point falls off the raster.
    pub pixel: Option<PixelIndex>,
}

/// Samples for one direction, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionPlan {
    pub direction: Direction,
    pub samples: [PlannedSample; 4],
}

/// Every sample needed to assess one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePlan {
    pub location: Location,
    pub origin: MapPoint,
    pub directions: Vec<DirectionPlan>,
}

impl SamplePlan {
    /// Fails with `OutOfCoverage` when the site itself is not on the raster.
    pub fn build(
        location: Location,
        metadata: &RasterMetadata,
        projection: &AlbersEqualArea,
    ) -> ExposureResult<Self> {
        location.validate()?;

        let origin = projection.forward(location.lon, location.lat);
        if !origin.x.is_finite() || !origin.y.is_finite() || metadata.pixel_at(origin).is_none() {
            return Err(ExposureError::OutOfCoverage(format!(
                "({}, {}) is outside the land cover raster",
                location.lat, location.lon
            )));
        }

        let directions = Direction::ALL
            .iter()
            .map(|&direction| {
                let samples = SAMPLE_DISTANCES_M.map(|distance_m| {
                    let point = destination_point(origin, direction.bearing_deg(), distance_m);
                    PlannedSample {
                        distance_m,
                        point,
                        pixel: metadata.pixel_at(point),
                    }
                });
                DirectionPlan { direction, samples }
            })
            .collect();

        Ok(Self {
            location,
            origin,
            directions,
        })
    }

    /// Pixels that need reading, in plan order. May repeat.
    pub fn pixels(&self) -> impl Iterator<Item = PixelIndex> + '_ {
        self.directions
            .iter()
            .flat_map(|d| d.samples.iter().filter_map(|s| s.pixel))
    }
}
