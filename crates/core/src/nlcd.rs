//! National Land Cover Database legend and roughness rules.
//!
//! Provides class names for report enrichment and the land-cover ->
//! roughness -> exposure mapping used by the analyzer.

use crate::types::{ExposureCategory, Roughness};

/// Legend entry for one land-cover code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandCoverClass {
    pub code: u16,
    pub name: &'static str,
}

impl LandCoverClass {
    const fn new(code: u16, name: &'static str) -> Self {
        Self { code, name }
    }
}

static LEGEND: &[LandCoverClass] = &[
    LandCoverClass::new(0, "Unclassified"),
    // ── Water ────────────────────────────────────────────────
    LandCoverClass::new(11, "Open Water"),
    LandCoverClass::new(12, "Perennial Ice/Snow"),
    // ── Developed ────────────────────────────────────────────
    LandCoverClass::new(21, "Developed, Open Space"),
    LandCoverClass::new(22, "Developed, Low Intensity"),
    LandCoverClass::new(23, "Developed, Medium Intensity"),
    LandCoverClass::new(24, "Developed, High Intensity"),
    // ── Barren ───────────────────────────────────────────────
    LandCoverClass::new(31, "Barren Land"),
    // ── Forest ───────────────────────────────────────────────
    LandCoverClass::new(41, "Deciduous Forest"),
    LandCoverClass::new(42, "Evergreen Forest"),
    LandCoverClass::new(43, "Mixed Forest"),
    // ── Shrubland ────────────────────────────────────────────
    LandCoverClass::new(51, "Dwarf Scrub"),
    LandCoverClass::new(52, "Shrub/Scrub"),
    // ── Herbaceous ───────────────────────────────────────────
    LandCoverClass::new(71, "Grassland/Herbaceous"),
    LandCoverClass::new(72, "Sedge/Herbaceous"),
    LandCoverClass::new(73, "Lichens"),
    LandCoverClass::new(74, "Moss"),
    // ── Planted/Cultivated ───────────────────────────────────
    LandCoverClass::new(81, "Pasture/Hay"),
    LandCoverClass::new(82, "Cultivated Crops"),
    // ── Wetlands ─────────────────────────────────────────────
    LandCoverClass::new(90, "Woody Wetlands"),
    LandCoverClass::new(95, "Emergent Herbaceous Wetlands"),
];

/// Codes that produce roughness B: developed land, forest, woody wetlands.
const ROUGHNESS_B_CODES: [u16; 8] = [21, 22, 23, 24, 41, 42, 43, 90];

const OPEN_WATER: u16 = 11;

/// Returns the legend entry for a code, if any.
pub fn lookup(code: u16) -> Option<&'static LandCoverClass> {
    LEGEND.iter().find(|c| c.code == code)
}

/// Returns the class name for a code, if any.
pub fn class_name(code: u16) -> Option<&'static str> {
    lookup(code).map(|c| c.name)
}

/// Roughness for a land-cover code. Unknown codes fall into C.
pub fn roughness_from_nlcd(code: u16) -> Roughness {
    if ROUGHNESS_B_CODES.contains(&code) {
        Roughness::B
    } else if code == OPEN_WATER {
        Roughness::D
    } else {
        Roughness::C
    }
}

pub fn exposure_from_roughness(roughness: Roughness) -> ExposureCategory {
    match roughness {
        Roughness::B => ExposureCategory::B,
        Roughness::D => ExposureCategory::D,
        Roughness::C => ExposureCategory::C,
    }
}

/// Most frequent code; ties go to the smallest code.
///
/// Matches `numpy.bincount(samples).argmax()`.
pub fn dominant_class(samples: &[u16]) -> Option<u16> {
    let mut sorted: smallvec::SmallVec<[u16; 8]> = samples.iter().copied().collect();
    sorted.sort_unstable();

    let mut best: Option<(u16, usize)> = None;
    for run in sorted.chunk_by(|a, b| a == b) {
        let (code, count) = (run[0], run.len());
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((code, count)),
        }
    }
    best.map(|(code, _)| code)
}
