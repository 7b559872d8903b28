//! Reference color tables and nearest-swatch matching under CIEDE2000.

use crate::{
    colorspace::{rgb_to_lab, LabD50},
    AnalysisError, Result,
};
use palette::{color_difference::Ciede2000, Lab, Srgb};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, io::Read, path::Path, sync::Arc};

/// The display name of the entry synthesized when a table has no white.
pub const WHITE_NAME: &str = "White";

/// One named swatch in a reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// The human readable name of the swatch.
    #[serde(rename = "name")]
    pub display_name: String,
    /// The swatch code. Not necessarily unique within a table.
    pub code: String,
    /// Lightness, in `[0, 100]`.
    #[serde(rename = "L")]
    pub l: f64,
    /// Green-red chromaticity.
    pub a: f64,
    /// Blue-yellow chromaticity.
    pub b: f64,
}

impl ReferenceEntry {
    /// Creates a new [`ReferenceEntry`].
    #[must_use]
    pub fn new(display_name: impl Into<String>, code: impl Into<String>, lab: [f64; 3]) -> Self {
        let [l, a, b] = lab;
        Self {
            display_name: display_name.into(),
            code: code.into(),
            l,
            a,
            b,
        }
    }

    /// The swatch color as D50 CIELAB.
    #[must_use]
    pub fn lab(&self) -> LabD50 {
        Lab::new(self.l, self.a, self.b)
    }

    /// Whether the display name contains "white", ignoring case.
    #[must_use]
    pub fn is_whiteish(&self) -> bool {
        self.display_name.to_lowercase().contains("white")
    }

    /// The synthesized white baseline entry.
    #[must_use]
    pub fn white() -> Self {
        Self::new(WHITE_NAME, WHITE_NAME, [100.0, 0.0, 0.0])
    }
}

/// An immutable, cheaply cloneable table of reference swatches.
///
/// Table order is significant: matching ties are broken in favor of the earlier entry.
///
/// # Examples
/// ```
/// # use inkmeter::{ReferenceEntry, ReferenceTable};
/// let table = ReferenceTable::new(vec![ReferenceEntry::new("Red 032 C", "032 C", [52.0, 73.0, 43.0])])
///     .with_white_baseline();
/// assert_eq!(table.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable(Arc<[ReferenceEntry]>);

impl ReferenceTable {
    /// Creates a table from the given entries as they are.
    #[must_use]
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self(entries.into())
    }

    /// Returns the table with a `White` entry at Lab `(100, 0, 0)` appended,
    /// unless it already has a white-ish entry.
    #[must_use]
    pub fn with_white_baseline(self) -> Self {
        if self.0.iter().any(ReferenceEntry::is_whiteish) {
            self
        } else {
            tracing::warn!(entries = self.0.len(), "reference table has no white, adding one");
            let mut entries = self.0.to_vec();
            entries.push(ReferenceEntry::white());
            Self::new(entries)
        }
    }

    /// A minimal two-entry table with black and white, used when no table is available.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(vec![
            ReferenceEntry::new("Black C", "Black C", [0.0, 0.0, 0.0]),
            ReferenceEntry::white(),
        ])
    }

    /// Parses a JSON array of `{"name", "code", "L", "a", "b"}` objects,
    /// then adds the white baseline if needed.
    ///
    /// # Errors
    /// Returns [`AnalysisError::ReferenceParse`] if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries = serde_json::from_str(json)?;
        Ok(Self::new(entries).with_white_baseline())
    }

    /// Like [`ReferenceTable::from_json_str`], but reads from a reader.
    ///
    /// # Errors
    /// Returns [`AnalysisError::ReferenceParse`] if the JSON is malformed or cannot be read.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let entries = serde_json::from_reader(reader)?;
        Ok(Self::new(entries).with_white_baseline())
    }

    /// Loads a table from a JSON file, then adds the white baseline if needed.
    ///
    /// # Errors
    /// Returns [`AnalysisError::ReferenceRead`] if the file cannot be opened,
    /// or [`AnalysisError::ReferenceParse`] if its contents are malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| AnalysisError::ReferenceRead {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(BufReader::new(file))?;
        tracing::debug!(path = %path.display(), entries = table.len(), "loaded reference table");
        Ok(table)
    }

    /// The entries of the table, in order.
    #[must_use]
    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.0
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ReferenceEntry> for ReferenceTable {
    fn from_iter<T: IntoIterator<Item = ReferenceEntry>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The closest reference entry to a color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMatch {
    /// The display name of the matched entry.
    pub name: String,
    /// The code of the matched entry.
    pub code: String,
    /// The CIEDE2000 distance, rounded to two decimal places.
    pub distance: f64,
}

/// Finds the entry closest to `lab` under CIEDE2000.
///
/// Ties are broken in favor of the earliest entry.
///
/// # Errors
/// Returns [`AnalysisError::NoReferenceData`] if `entries` is empty.
pub fn match_lab(lab: LabD50, entries: &[ReferenceEntry]) -> Result<ReferenceMatch> {
    let mut best: Option<(&ReferenceEntry, f64)> = None;
    for entry in entries {
        let distance = lab.difference(entry.lab());
        if best.map_or(true, |(_, min)| distance < min) {
            best = Some((entry, distance));
        }
    }

    let (entry, distance) = best.ok_or(AnalysisError::NoReferenceData)?;
    Ok(ReferenceMatch {
        name: entry.display_name.clone(),
        code: entry.code.clone(),
        distance: crate::report::round2(distance),
    })
}

/// Finds the entry closest to an sRGB color under CIEDE2000.
///
/// # Errors
/// Returns [`AnalysisError::NoReferenceData`] if `entries` is empty.
pub fn match_color(color: Srgb<u8>, entries: &[ReferenceEntry]) -> Result<ReferenceMatch> {
    match_lab(rgb_to_lab(color), entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn red_blue() -> ReferenceTable {
        ReferenceTable::new(vec![
            ReferenceEntry::new("Blue", "B", [29.57, 68.30, -112.03]),
            ReferenceEntry::new("Red", "R", [54.29, 80.80, 69.89]),
        ])
    }

    #[test]
    fn empty_table_has_no_data() {
        let err = match_color(Srgb::new(1, 2, 3), &[]).unwrap_err();
        assert!(matches!(err, AnalysisError::NoReferenceData));
    }

    #[test]
    fn nearest_entry_wins() {
        let table = red_blue();
        let m = match_color(Srgb::new(250, 10, 10), table.entries()).unwrap();
        assert_eq!(m.name, "Red");
        assert_eq!(m.code, "R");
        assert!(m.distance > 0.0);
    }

    #[test]
    fn exact_match_has_zero_distance() {
        let lab = rgb_to_lab(Srgb::new(12, 140, 200));
        let table = ReferenceTable::new(vec![
            ReferenceEntry::new("Other", "O", [50.0, 0.0, 0.0]),
            ReferenceEntry::new("Exact", "E", [lab.l, lab.a, lab.b]),
        ]);
        let m = match_color(Srgb::new(12, 140, 200), table.entries()).unwrap();
        assert_eq!(m.name, "Exact");
        assert_eq!(m.distance, 0.0);
    }

    #[test]
    fn ties_keep_first_entry() {
        let table = ReferenceTable::new(vec![
            ReferenceEntry::new("First", "1", [50.0, 10.0, 10.0]),
            ReferenceEntry::new("Second", "2", [50.0, 10.0, 10.0]),
        ]);
        let m = match_lab(Lab::new(40.0, 0.0, 0.0), table.entries()).unwrap();
        assert_eq!(m.name, "First");
    }

    #[test]
    fn matching_is_repeatable() {
        let table = red_blue();
        let a = match_color(Srgb::new(90, 60, 200), table.entries()).unwrap();
        let b = match_color(Srgb::new(90, 60, 200), table.entries()).unwrap();
        assert_eq!(a, b);
        assert!(a.distance >= 0.0);
    }

    #[test]
    fn white_baseline_added_once() {
        let table = red_blue().with_white_baseline();
        assert_eq!(table.len(), 3);
        assert_eq!(table.entries()[2], ReferenceEntry::white());
        assert_eq!(table.clone().with_white_baseline(), table);

        let named = ReferenceTable::new(vec![ReferenceEntry::new("Off-WHITE 11", "11", [95.0, 0.0, 2.0])]);
        assert_eq!(named.clone().with_white_baseline(), named);
    }

    #[test]
    fn parses_extractor_json() {
        let json = r#"[
            {"name": "Yellow C", "code": "Yellow C", "L": 88.5, "a": -6.1, "b": 94.3},
            {"name": "Black C", "code": "Black C", "L": 16.0, "a": 0.0, "b": -1.0}
        ]"#;
        let table = ReferenceTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.entries()[0].display_name, "Yellow C");
        assert_eq!(table.entries()[0].l, 88.5);
        assert!(table.entries()[2].is_whiteish());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = ReferenceTable::from_json_str(r#"[{"name": "x"}]"#).unwrap_err();
        assert!(matches!(err, AnalysisError::ReferenceParse(_)));
    }

    #[test]
    fn fallback_has_black_and_white() {
        let table = ReferenceTable::fallback();
        let white = match_color(Srgb::new(255, 255, 255), table.entries()).unwrap();
        assert_eq!(white.name, "White");
        let black = match_color(Srgb::new(0, 0, 0), table.entries()).unwrap();
        assert_eq!(black.name, "Black C");
        assert_eq!(black.distance, 0.0);
    }
}
