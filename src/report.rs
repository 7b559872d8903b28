//! The analysis report and paint quantity calculation.

use crate::{colorspace, ReferenceMatch};
use palette::Srgb;
use serde::{Deserialize, Serialize};

/// Rounds to two decimal places.
#[must_use]
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Converts an area into a paint mass in grams, rounded to two decimal places.
///
/// Non-positive areas give zero.
///
/// # Examples
/// ```
/// # use inkmeter::paint_grams;
/// assert_eq!(paint_grams(12.345, 2.0), 24.69);
/// assert_eq!(paint_grams(-3.0, 2.0), 0.0);
/// ```
#[must_use]
pub fn paint_grams(area_mm2: f64, multiplier: f64) -> f64 {
    if area_mm2 <= 0.0 {
        0.0
    } else {
        round2(area_mm2 * multiplier)
    }
}

/// One ink color in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorReportEntry {
    /// The cluster center.
    pub rgb: [u8; 3],
    /// The cluster center as `#RRGGBB`.
    pub hex: String,
    /// The closest reference swatch.
    pub matched_reference: ReferenceMatch,
    /// The physical area covered by this color, rounded to two decimal places.
    pub area_mm2: f64,
    /// The share of the image, from 0 to 100, rounded to two decimal places.
    pub percentage: f64,
    /// The paint mass for the (unrounded) area.
    pub paint_grams: f64,
}

impl ColorReportEntry {
    /// Builds the entry for a cluster with the given share of the samples.
    #[must_use]
    pub fn new(
        color: Srgb<u8>,
        share: f64,
        matched_reference: ReferenceMatch,
        total_area_mm2: f64,
        multiplier: f64,
    ) -> Self {
        let (r, g, b) = color.into_components();
        let area = share * total_area_mm2;
        Self {
            rgb: [r, g, b],
            hex: colorspace::hex(color),
            matched_reference,
            area_mm2: round2(area),
            percentage: round2(share * 100.0),
            paint_grams: paint_grams(area, multiplier),
        }
    }
}

/// The complete color separation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// The physical area of the whole image, rounded to two decimal places.
    pub total_area_mm2: f64,
    /// The number of distinct colors left after filtering.
    pub unique_colors_count: usize,
    /// The selected number of clusters.
    pub optimal_k: usize,
    /// One entry per non-empty cluster, in clustering order.
    pub colors: Vec<ColorReportEntry>,
    /// The paint mass for the whole area.
    pub total_paint_grams: f64,
}
