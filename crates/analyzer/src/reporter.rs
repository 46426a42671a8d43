//! Human-readable exposure report.
//!
//! Takes an `ExposureReport` and produces a boxed table with class names,
//! per-direction categories, and summary statistics.

use exposure_core::{DirectionExposure, ExposureCategory, ExposureReport, Location, MapPoint};

/// Report with summary statistics, ready to render or flatten into rows.
#[derive(Debug)]
pub struct Report {
    pub location: Location,
    pub origin: MapPoint,
    pub directions: Vec<DirectionExposure>,
    /// Directions per exposure category, in B, C, D order.
    pub category_counts: [usize; 3],
    /// Most severe exposure across all directions.
    pub governing: ExposureCategory,
    /// Samples that did not vote (off the raster or nodata).
    pub missing_samples: usize,
    pub elapsed: std::time::Duration,
}

/// Severity order: D (open water, flat) is the most exposed.
pub(crate) fn severity(category: ExposureCategory) -> u8 {
    match category {
        ExposureCategory::B => 0,
        ExposureCategory::C => 1,
        ExposureCategory::D => 2,
    }
}

impl Report {
    pub fn build(report: &ExposureReport, elapsed: std::time::Duration) -> Self {
        let mut category_counts = [0usize; 3];
        for r in &report.results {
            category_counts[severity(r.exposure) as usize] += 1;
        }

        let governing = report
            .results
            .iter()
            .map(|r| r.exposure)
            .max_by_key(|c| severity(*c))
            .unwrap_or(ExposureCategory::C);

        let missing_samples = report
            .results
            .iter()
            .flat_map(|r| r.samples.iter())
            .filter(|s| s.class.is_none())
            .count();

        Report {
            location: report.location,
            origin: report.origin,
            directions: report.results.clone(),
            category_counts,
            governing,
            missing_samples,
            elapsed,
        }
    }

    /// Render the report as a formatted string.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                   WIND EXPOSURE REPORT                       ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str(&format!(
            "║  Latitude:           {:>39.6} ║\n",
            self.location.lat
        ));
        out.push_str(&format!(
            "║  Longitude:          {:>39.6} ║\n",
            self.location.lon
        ));
        out.push_str(&format!(
            "║  Height (ft):        {:>39.1} ║\n",
            self.location.height_ft
        ));
        out.push_str(&format!(
            "║  Albers x / y (m):   {:>39} ║\n",
            format!("{:.1} / {:.1}", self.origin.x, self.origin.y)
        ));
        out.push_str(&format!(
            "║  Exposure B/C/D:     {:>39} ║\n",
            format!(
                "{} / {} / {}",
                self.category_counts[0], self.category_counts[1], self.category_counts[2]
            )
        ));
        out.push_str(&format!("║  Governing:          {:>39} ║\n", self.governing));
        out.push_str(&format!(
            "║  Missing samples:    {:>39} ║\n",
            self.missing_samples
        ));
        out.push_str(&format!("║  Time:               {:>39?} ║\n", self.elapsed));
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str("║  DIR  ROUGH  EXPO  CLASS                                     ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for d in &self.directions {
            let class = match (d.dominant_class, d.class_name) {
                (Some(code), Some(name)) => format!("{code} {name}"),
                (Some(code), None) => format!("{code}"),
                _ => "no data".to_string(),
            };
            out.push_str(&format!(
                "║  {:<4} {:^5}  {:^4}  {:<42}║\n",
                d.direction.label(),
                d.roughness.to_string(),
                d.exposure.to_string(),
                class
            ));
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}
