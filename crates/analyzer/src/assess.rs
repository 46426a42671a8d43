//! Land-cover classification of a planned site.
//!
//! Pure and synchronous: reads only the prefetched [`TileSet`].

use crate::plan::{DirectionPlan, SamplePlan};
use exposure_core::nlcd::{class_name, dominant_class, exposure_from_roughness, roughness_from_nlcd};
use exposure_core::{
    DirectionExposure, ExposureCategory, ExposureReport, Roughness, SampleRecord, TileSet,
};
use smallvec::SmallVec;

/// Classifies every direction of `plan`.
///
/// Samples off the raster, in unfetched tiles, or equal to `nodata` do not
/// vote. A direction with no votes is open terrain (C).
pub fn assess(plan: &SamplePlan, tiles: &TileSet, nodata: Option<u16>) -> ExposureReport {
    let results = plan
        .directions
        .iter()
        .map(|d| assess_direction(d, tiles, nodata))
        .collect();

    ExposureReport {
        location: plan.location,
        origin: plan.origin,
        results,
    }
}

fn assess_direction(plan: &DirectionPlan, tiles: &TileSet, nodata: Option<u16>) -> DirectionExposure {
    let samples: SmallVec<[SampleRecord; 4]> = plan
        .samples
        .iter()
        .map(|s| {
            let class = s
                .pixel
                .and_then(|p| tiles.pixel(p))
                .filter(|&v| Some(v) != nodata);
            SampleRecord {
                distance_m: s.distance_m,
                point: s.point,
                pixel: s.pixel,
                class,
            }
        })
        .collect();

    let codes: SmallVec<[u16; 4]> = samples.iter().filter_map(|s| s.class).collect();
    let dominant = dominant_class(&codes);

    let (roughness, exposure) = match dominant {
        Some(code) => {
            let roughness = roughness_from_nlcd(code);
            (roughness, exposure_from_roughness(roughness))
        }
        None => {
            tracing::debug!(direction = %plan.direction, "no valid land cover samples");
            (Roughness::C, ExposureCategory::C)
        }
    };

    DirectionExposure {
        direction: plan.direction,
        roughness,
        exposure,
        dominant_class: dominant,
        class_name: dominant.and_then(class_name),
        samples,
    }
}
