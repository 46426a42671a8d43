//! Data sink for batch exposure results.
//!
//! Three row schemas:
//! - [`LocationSummaryRow`]: one per assessed site
//! - [`DirectionRow`]: one per site and compass direction (denormalized)
//! - [`LocationErrorRow`]: one per site that could not be assessed
//!
//! Rows are written as NDJSON by [`json_stream::JsonStreamSink`].

pub mod json_stream;

use crate::reporter::Report;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

/// One row per assessed site: summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct LocationSummaryRow {
    pub row_type: &'static str,
    pub location_id: u64,
    pub lat: f64,
    pub lon: f64,
    pub height_ft: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    pub exposure_b: u32,
    pub exposure_c: u32,
    pub exposure_d: u32,
    pub governing_exposure: String,
    pub missing_samples: u32,
    pub elapsed_ms: u64,
    pub created_at: String,
}

/// One row per direction, append-only, fully denormalized.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionRow {
    pub row_type: &'static str,
    pub location_id: u64,
    pub lat: f64,
    pub lon: f64,
    pub direction: String,
    pub roughness: String,
    pub exposure: String,
    pub dominant_class: Option<u16>,
    pub class_name: Option<String>,
    /// Samples that voted for the dominant class computation.
    pub valid_samples: u32,
    pub created_at: String,
}

/// A site that failed validation or lies outside coverage.
#[derive(Debug, Clone, Serialize)]
pub struct LocationErrorRow {
    pub row_type: &'static str,
    pub location_id: u64,
    pub lat: f64,
    pub lon: f64,
    pub height_ft: f64,
    pub error: String,
    pub created_at: String,
}

impl LocationErrorRow {
    pub fn new(location_id: u64, location: exposure_core::Location, error: &impl ToString) -> Self {
        Self {
            row_type: "error",
            location_id,
            lat: location.lat,
            lon: location.lon,
            height_ft: location.height_ft,
            error: error.to_string(),
            created_at: utc_now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder: Report -> Rows
// ---------------------------------------------------------------------------

impl Report {
    /// Flatten the report into sink-ready rows.
    pub fn to_rows(&self, location_id: u64) -> (LocationSummaryRow, Vec<DirectionRow>) {
        let now = utc_now();

        let summary = LocationSummaryRow {
            row_type: "summary",
            location_id,
            lat: self.location.lat,
            lon: self.location.lon,
            height_ft: self.location.height_ft,
            origin_x: self.origin.x,
            origin_y: self.origin.y,
            exposure_b: self.category_counts[0] as u32,
            exposure_c: self.category_counts[1] as u32,
            exposure_d: self.category_counts[2] as u32,
            governing_exposure: self.governing.to_string(),
            missing_samples: self.missing_samples as u32,
            elapsed_ms: self.elapsed.as_millis() as u64,
            created_at: now.clone(),
        };

        let directions = self
            .directions
            .iter()
            .map(|d| DirectionRow {
                row_type: "direction",
                location_id,
                lat: self.location.lat,
                lon: self.location.lon,
                direction: d.direction.to_string(),
                roughness: d.roughness.to_string(),
                exposure: d.exposure.to_string(),
                dominant_class: d.dominant_class,
                class_name: d.class_name.map(str::to_string),
                valid_samples: d.samples.iter().filter(|s| s.class.is_some()).count() as u32,
                created_at: now.clone(),
            })
            .collect();

        (summary, directions)
    }
}

/// ISO-8601 UTC timestamp, second precision.
pub fn utc_now() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
