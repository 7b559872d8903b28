//! Background detection and removal.
//!
//! Backgrounds are removed in one of two ways, tried in order:
//! 1. A spatial pass that flood fills outward from the four image corners,
//!    masking every pixel connected to a corner through near-identical colors.
//! 2. A statistical pass, used only if the spatial pass cannot run, which
//!    marks the dominant color (and an optional dark secondary layer) as background.
//!
//! Independently of both, [`drop_near_black`] removes every color whose
//! brightest channel is below a threshold.

use crate::{ColorHistogram, PixelGrid};
use bitvec::vec::BitVec;
use palette::Srgb;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The default maximum summed RGBA difference from a corner seed for a pixel to be flooded.
pub const DEFAULT_FLOOD_TOLERANCE: u32 = 5;

/// The default brightest-channel value below which [`drop_near_black`] removes a color.
pub const DEFAULT_NEAR_BLACK_MAX_CHANNEL: u8 = 60;

/// Thresholds for the statistical (dominant color) background pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalThresholds {
    /// The share of all pixels the most frequent color must exceed to count as background.
    pub primary_share: f64,
    /// Colors strictly closer than this (Euclidean RGB) to the primary color are also removed.
    pub primary_distance: f64,
    /// A secondary candidate must have every channel below this value.
    pub dark_max_channel: u8,
    /// The share of all pixels a secondary candidate must exceed.
    pub secondary_share: f64,
    /// Colors strictly closer than this to the secondary color are also removed.
    pub secondary_distance: f64,
    /// How many of the next most frequent colors are searched for a secondary layer.
    pub secondary_scan: usize,
}

impl StatisticalThresholds {
    /// Creates a new [`StatisticalThresholds`] with the default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            primary_share: 0.20,
            primary_distance: 40.0,
            dark_max_channel: 50,
            secondary_share: 0.10,
            secondary_distance: 60.0,
            secondary_scan: 10,
        }
    }
}

impl Default for StatisticalThresholds {
    fn default() -> Self {
        Self::new()
    }
}

/// Options controlling which background filters run.
///
/// # Examples
/// ```
/// # use inkmeter::BackgroundOptions;
/// let options = BackgroundOptions::new()
///     .ignore_background(true)
///     .flood_tolerance(8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundOptions {
    /// Whether to detect and remove the background.
    pub(crate) ignore_background: bool,
    /// Whether to drop every near-black color.
    pub(crate) ignore_black: bool,
    /// See [`DEFAULT_FLOOD_TOLERANCE`].
    pub(crate) flood_tolerance: u32,
    /// See [`DEFAULT_NEAR_BLACK_MAX_CHANNEL`].
    pub(crate) near_black_max_channel: u8,
    /// Thresholds for the statistical fallback.
    pub(crate) statistical: StatisticalThresholds,
}

impl Default for BackgroundOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundOptions {
    /// Creates a new [`BackgroundOptions`] with both filters turned off.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ignore_background: false,
            ignore_black: false,
            flood_tolerance: DEFAULT_FLOOD_TOLERANCE,
            near_black_max_channel: DEFAULT_NEAR_BLACK_MAX_CHANNEL,
            statistical: StatisticalThresholds::new(),
        }
    }

    /// Sets whether to detect and remove the image background.
    ///
    /// The default is `false`.
    #[must_use]
    pub const fn ignore_background(mut self, ignore_background: bool) -> Self {
        self.ignore_background = ignore_background;
        self
    }

    /// Sets whether to remove every color with all channels below the near-black threshold.
    ///
    /// This is independent of [`BackgroundOptions::ignore_background`].
    /// The default is `false`.
    #[must_use]
    pub const fn ignore_black(mut self, ignore_black: bool) -> Self {
        self.ignore_black = ignore_black;
        self
    }

    /// Sets the flood fill tolerance, the maximum sum of absolute RGBA channel differences
    /// between a pixel and the corner seed.
    ///
    /// The default is [`DEFAULT_FLOOD_TOLERANCE`].
    #[must_use]
    pub const fn flood_tolerance(mut self, tolerance: u32) -> Self {
        self.flood_tolerance = tolerance;
        self
    }

    /// Sets the brightest-channel value below which colors count as near-black.
    ///
    /// The default is [`DEFAULT_NEAR_BLACK_MAX_CHANNEL`].
    #[must_use]
    pub const fn near_black_max_channel(mut self, max_channel: u8) -> Self {
        self.near_black_max_channel = max_channel;
        self
    }

    /// Sets the thresholds used by the statistical fallback.
    #[must_use]
    pub const fn statistical(mut self, thresholds: StatisticalThresholds) -> Self {
        self.statistical = thresholds;
        self
    }
}

/// The reason the spatial pass could not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloodFillError {
    /// The grid has no pixels, so there are no corners to seed from.
    EmptyGrid,
}

impl fmt::Display for FloodFillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodFillError::EmptyGrid => write!(f, "grid has no corner pixels"),
        }
    }
}

/// Sum of absolute per-channel differences.
#[inline]
fn channel_difference(a: [u8; 4], b: [u8; 4]) -> u32 {
    a.iter().zip(b).map(|(&x, y)| u32::from(x.abs_diff(y))).sum()
}

/// Flood fills from each corner of the grid and returns the mask of flooded pixels.
///
/// Each fill is 4-connected and compares every candidate against the color of its own seed.
/// Corners that are fully transparent, that are already part of an earlier fill,
/// or that are within `tolerance` of transparent black are not used as seeds.
pub(crate) fn flood_fill_corners(
    grid: &PixelGrid,
    tolerance: u32,
) -> Result<BitVec, FloodFillError> {
    if grid.is_empty() {
        return Err(FloodFillError::EmptyGrid);
    }

    let width = grid.width() as usize;
    let height = grid.height() as usize;
    let len = width * height;
    let mut mask = BitVec::repeat(false, len);
    let mut stack = Vec::new();

    let corners = [0, width - 1, len - width, len - 1];
    for seed in corners {
        let seed_color = grid.rgba(seed);
        if seed_color[3] == 0
            || mask[seed]
            || channel_difference(seed_color, [0; 4]) <= tolerance
        {
            continue;
        }

        mask.set(seed, true);
        stack.push(seed);

        while let Some(i) = stack.pop() {
            let (x, y) = (i % width, i / width);
            let neighbors = [
                (x > 0).then(|| i - 1),
                (x + 1 < width).then(|| i + 1),
                (y > 0).then(|| i - width),
                (y + 1 < height).then(|| i + width),
            ];

            for j in neighbors.into_iter().flatten() {
                if !mask[j] && channel_difference(grid.rgba(j), seed_color) <= tolerance {
                    mask.set(j, true);
                    stack.push(j);
                }
            }
        }
    }

    Ok(mask)
}

/// A color marked as background by the statistical pass,
/// along with the distance under which similar colors are removed too.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IgnoredColor {
    /// The background color.
    pub color: Srgb<u8>,
    /// Colors strictly closer than this (Euclidean RGB) are removed.
    pub threshold: f64,
}

impl IgnoredColor {
    /// Whether `color` is close enough to this background color to be removed.
    #[must_use]
    pub fn covers(&self, color: Srgb<u8>) -> bool {
        rgb_distance(self.color, color) < self.threshold
    }
}

/// Euclidean distance between two colors in 8-bit RGB space.
#[must_use]
pub fn rgb_distance(a: Srgb<u8>, b: Srgb<u8>) -> f64 {
    let (r1, g1, b1) = a.into_components();
    let (r2, g2, b2) = b.into_components();
    let dr = f64::from(r1) - f64::from(r2);
    let dg = f64::from(g1) - f64::from(g2);
    let db = f64::from(b1) - f64::from(b2);
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Picks background colors from the histogram's frequency distribution.
///
/// Shares are relative to `total_pixels`, the full pixel count of the grid
/// (transparent pixels included). Returns at most one primary and one secondary color.
#[must_use]
pub fn statistical_background(
    histogram: &ColorHistogram,
    total_pixels: u32,
    thresholds: &StatisticalThresholds,
) -> Vec<IgnoredColor> {
    if total_pixels == 0 {
        return Vec::new();
    }

    let total = f64::from(total_pixels);
    let by_frequency = histogram.by_frequency();

    let Some(&(primary, primary_count)) = by_frequency.first() else {
        return Vec::new();
    };

    if f64::from(primary_count) / total <= thresholds.primary_share {
        return Vec::new();
    }

    let primary = IgnoredColor {
        color: primary,
        threshold: thresholds.primary_distance,
    };

    let secondary = by_frequency
        .iter()
        .skip(1)
        .take(thresholds.secondary_scan)
        .find(|&&(color, count)| {
            let (r, g, b) = color.into_components();
            !primary.covers(color)
                && r.max(g).max(b) < thresholds.dark_max_channel
                && f64::from(count) / total > thresholds.secondary_share
        })
        .map(|&(color, _)| IgnoredColor {
            color,
            threshold: thresholds.secondary_distance,
        });

    std::iter::once(primary).chain(secondary).collect()
}

/// The result of background removal, tagged by which pass produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundOutcome {
    /// The corner flood fill ran. The histogram was rebuilt without the flooded pixels.
    Spatial {
        /// The histogram of the remaining pixels.
        histogram: ColorHistogram,
        /// The number of pixels flooded from the corners.
        removed_pixels: usize,
    },
    /// The flood fill could not run and the dominant color heuristic was used instead.
    Statistical {
        /// The histogram without the colors covered by `ignored`.
        histogram: ColorHistogram,
        /// The colors that were marked as background.
        ignored: Vec<IgnoredColor>,
    },
}

impl BackgroundOutcome {
    /// The filtered histogram.
    #[must_use]
    pub fn histogram(&self) -> &ColorHistogram {
        match self {
            BackgroundOutcome::Spatial { histogram, .. }
            | BackgroundOutcome::Statistical { histogram, .. } => histogram,
        }
    }

    /// Consumes the outcome and returns the filtered histogram.
    #[must_use]
    pub fn into_histogram(self) -> ColorHistogram {
        match self {
            BackgroundOutcome::Spatial { histogram, .. }
            | BackgroundOutcome::Statistical { histogram, .. } => histogram,
        }
    }
}

/// Removes the background of `grid`.
///
/// `histogram` must be the unfiltered histogram of `grid`.
/// It is only used if the spatial pass cannot run.
#[must_use]
pub fn remove_background(
    grid: &PixelGrid,
    histogram: &ColorHistogram,
    options: &BackgroundOptions,
) -> BackgroundOutcome {
    remove_background_with(grid, histogram, options, ColorHistogram::masked)
}

/// Removes the background of `grid` in parallel.
/// The result is identical to [`remove_background`].
#[cfg(feature = "threads")]
#[must_use]
pub fn remove_background_par(
    grid: &PixelGrid,
    histogram: &ColorHistogram,
    options: &BackgroundOptions,
) -> BackgroundOutcome {
    remove_background_with(grid, histogram, options, ColorHistogram::masked_par)
}

/// Shared implementation of [`remove_background`] with a pluggable masked histogram builder.
fn remove_background_with(
    grid: &PixelGrid,
    histogram: &ColorHistogram,
    options: &BackgroundOptions,
    masked: impl FnOnce(&PixelGrid, &bitvec::slice::BitSlice) -> ColorHistogram,
) -> BackgroundOutcome {
    match flood_fill_corners(grid, options.flood_tolerance) {
        Ok(mask) => {
            let removed_pixels = mask.count_ones();
            tracing::debug!(removed_pixels, "removed background by corner flood fill");
            BackgroundOutcome::Spatial {
                histogram: masked(grid, &mask),
                removed_pixels,
            }
        }
        Err(err) => {
            tracing::warn!(%err, "flood fill failed, falling back to dominant color detection");
            let ignored =
                statistical_background(histogram, grid.num_pixels(), &options.statistical);
            let histogram =
                histogram.retain(|color, _| !ignored.iter().any(|bg| bg.covers(color)));
            tracing::debug!(
                ignored = ignored.len(),
                remaining_colors = histogram.num_colors(),
                "removed background by dominant color"
            );
            BackgroundOutcome::Statistical { histogram, ignored }
        }
    }
}

/// Returns the histogram without every color whose brightest channel is below `max_channel`.
#[must_use]
pub fn drop_near_black(histogram: &ColorHistogram, max_channel: u8) -> ColorHistogram {
    histogram.retain(|color, _| {
        let (r, g, b) = color.into_components();
        r.max(g).max(b) >= max_channel
    })
}
