#![allow(clippy::unwrap_used)]

use std::io::Write;

use inkmeter::{
    colorspace::rgb_to_lab, AnalysisError, AnalysisPipeline, BackgroundOptions, Channels,
    PixelGrid, ReferenceEntry, ReferenceTable,
};
use palette::Srgb;
use pretty_assertions::assert_eq;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn lab_of(r: u8, g: u8, b: u8) -> [f64; 3] {
    let lab = rgb_to_lab(Srgb::new(r, g, b));
    [lab.l, lab.a, lab.b]
}

/// A `size * size` image of `outer` with a centered square of `inner`.
fn framed(size: u32, inset: u32, outer: [u8; 4], inner: [u8; 4]) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            let inside = (inset..size - inset).contains(&x) && (inset..size - inset).contains(&y);
            if inside {
                inner
            } else {
                outer
            }
        })
        .collect()
}

#[test]
fn solid_red_covers_the_whole_print() {
    let data = RED.repeat(100 * 100);
    let grid = PixelGrid::new(&data, 100, 100, Channels::Rgba).unwrap();

    let report = AnalysisPipeline::new(grid)
        .physical_size(10.0, 10.0)
        .analyze(&ReferenceTable::fallback())
        .unwrap();

    assert_eq!(report.total_area_mm2, 100.0);
    assert_eq!(report.total_paint_grams, 100.0);
    assert_eq!(report.unique_colors_count, 1);
    assert_eq!(report.optimal_k, 2);
    assert_eq!(report.colors.len(), 1);

    let entry = &report.colors[0];
    assert_eq!(entry.rgb, [255, 0, 0]);
    assert_eq!(entry.hex, "#FF0000");
    assert_eq!(entry.percentage, 100.0);
    assert_eq!(entry.area_mm2, 100.0);
    assert_eq!(entry.paint_grams, 100.0);
}

#[test]
fn corner_background_is_removed() {
    let data = framed(100, 35, BLUE, RED);
    let grid = PixelGrid::new(&data, 100, 100, Channels::Rgba).unwrap();
    let table = ReferenceTable::new(vec![
        ReferenceEntry::new("Reflex Blue C", "Reflex Blue C", lab_of(16, 20, 240)),
        ReferenceEntry::new("Warm Red C", "Warm Red C", lab_of(240, 30, 20)),
    ]);

    let report = AnalysisPipeline::new(grid)
        .background(BackgroundOptions::new().ignore_background(true))
        .analyze(&table)
        .unwrap();

    assert_eq!(report.unique_colors_count, 1);
    assert!(report.colors.iter().all(|c| c.rgb != [0, 0, 255]));
    assert_eq!(report.colors.len(), 1);
    assert_eq!(report.colors[0].matched_reference.name, "Warm Red C");
    assert_eq!(report.colors[0].percentage, 100.0);
}

#[test]
fn background_is_kept_by_default() {
    let data = framed(100, 35, BLUE, RED);
    let grid = PixelGrid::new(&data, 100, 100, Channels::Rgba).unwrap();

    let report = AnalysisPipeline::new(grid)
        .analyze(&ReferenceTable::fallback())
        .unwrap();

    assert_eq!(report.unique_colors_count, 2);
    assert!(report.colors.iter().any(|c| c.rgb == [0, 0, 255]));
}

#[test]
fn fully_transparent_image_has_no_colors() {
    let data = [0, 0, 0, 0].repeat(16 * 16);
    let grid = PixelGrid::new(&data, 16, 16, Channels::Rgba).unwrap();

    let err = AnalysisPipeline::new(grid)
        .analyze(&ReferenceTable::fallback())
        .unwrap_err();

    assert!(matches!(err, AnalysisError::NoColorsFound));
}

#[test]
fn loaded_table_gains_white() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"name": "Process Cyan C", "code": "Process Cyan C", "L": 55.0, "a": -37.0, "b": -50.0}}]"#
    )
    .unwrap();

    let table = ReferenceTable::load(file.path()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.entries()[1], ReferenceEntry::white());

    let data = [255, 255, 255, 255].repeat(8 * 8);
    let grid = PixelGrid::new(&data, 8, 8, Channels::Rgba).unwrap();
    let report = AnalysisPipeline::new(grid).analyze(&table).unwrap();

    assert_eq!(report.colors.len(), 1);
    let matched = &report.colors[0].matched_reference;
    assert_eq!(matched.name, "White");
    assert!(matched.distance < 0.5, "{}", matched.distance);
}

#[test]
fn missing_table_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReferenceTable::load(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, AnalysisError::ReferenceRead { .. }));
}
