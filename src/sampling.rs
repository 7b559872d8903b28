//! Reduces a color histogram to a bounded, weighted sample set for clustering.
//!
//! The quotas below were tuned by hand against real artwork. They are kept as
//! named, configurable values so they can be recalibrated without touching the algorithm.

use crate::{AnalysisError, ColorHistogram, Result};
use palette::Srgb;
use serde::{Deserialize, Serialize};
use std::collections::{hash_map::Entry, HashMap};

/// The default target number of samples.
pub const DEFAULT_SAMPLE_LIMIT: u32 = 50_000;

/// Colors with strictly more pixels than this (and strictly fewer than
/// [`DEFAULT_SMALL_REGION_MAX`]) are sampled in full.
pub const DEFAULT_SMALL_REGION_MIN: u32 = 20;

/// See [`DEFAULT_SMALL_REGION_MIN`].
pub const DEFAULT_SMALL_REGION_MAX: u32 = 600;

/// The default minimum quota for a color with at least [`DEFAULT_SMALL_REGION_MAX`] pixels.
pub const DEFAULT_MIN_QUOTA: u32 = 200;

/// The default largest fraction of the sample limit a single color may take.
pub const DEFAULT_DOMINANCE_CAP: f64 = 0.20;

/// The dominance cap only applies when the histogram has more distinct colors than this.
pub const DEFAULT_DOMINANCE_MIN_COLORS: usize = 5;

/// Sampling stops once the number of samples exceeds the sample limit times this factor.
pub const DEFAULT_OVERSHOOT: f64 = 1.2;

/// Colors with a mean channel value above this are highlights.
pub const DEFAULT_HIGHLIGHT_BRIGHTNESS: f64 = 200.0;

/// The number of extra samples added for every highlight color.
pub const DEFAULT_HIGHLIGHT_SAMPLES: u32 = 100;

/// Options for building a [`SampleSet`].
///
/// # Examples
/// ```
/// # use inkmeter::SamplingOptions;
/// let options = SamplingOptions::new()
///     .sample_limit(20_000)
///     .highlight_samples(0); // turn off highlight boosting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingOptions {
    /// See [`DEFAULT_SAMPLE_LIMIT`].
    pub(crate) sample_limit: u32,
    /// See [`DEFAULT_SMALL_REGION_MIN`].
    pub(crate) small_region_min: u32,
    /// See [`DEFAULT_SMALL_REGION_MAX`].
    pub(crate) small_region_max: u32,
    /// See [`DEFAULT_MIN_QUOTA`].
    pub(crate) min_quota: u32,
    /// See [`DEFAULT_DOMINANCE_CAP`].
    pub(crate) dominance_cap: f64,
    /// See [`DEFAULT_DOMINANCE_MIN_COLORS`].
    pub(crate) dominance_min_colors: usize,
    /// See [`DEFAULT_OVERSHOOT`].
    pub(crate) overshoot: f64,
    /// See [`DEFAULT_HIGHLIGHT_BRIGHTNESS`].
    pub(crate) highlight_brightness: f64,
    /// See [`DEFAULT_HIGHLIGHT_SAMPLES`].
    pub(crate) highlight_samples: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingOptions {
    /// Creates a new [`SamplingOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            small_region_min: DEFAULT_SMALL_REGION_MIN,
            small_region_max: DEFAULT_SMALL_REGION_MAX,
            min_quota: DEFAULT_MIN_QUOTA,
            dominance_cap: DEFAULT_DOMINANCE_CAP,
            dominance_min_colors: DEFAULT_DOMINANCE_MIN_COLORS,
            overshoot: DEFAULT_OVERSHOOT,
            highlight_brightness: DEFAULT_HIGHLIGHT_BRIGHTNESS,
            highlight_samples: DEFAULT_HIGHLIGHT_SAMPLES,
        }
    }

    /// Sets the target number of samples.
    ///
    /// The default is [`DEFAULT_SAMPLE_LIMIT`].
    #[must_use]
    pub const fn sample_limit(mut self, sample_limit: u32) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    /// Sets the exclusive pixel count bounds of a small region, which is sampled in full.
    ///
    /// The defaults are [`DEFAULT_SMALL_REGION_MIN`] and [`DEFAULT_SMALL_REGION_MAX`].
    #[must_use]
    pub const fn small_region(mut self, min: u32, max: u32) -> Self {
        self.small_region_min = min;
        self.small_region_max = max;
        self
    }

    /// Sets the minimum quota for colors that are not small regions.
    ///
    /// The default is [`DEFAULT_MIN_QUOTA`].
    #[must_use]
    pub const fn min_quota(mut self, min_quota: u32) -> Self {
        self.min_quota = min_quota;
        self
    }

    /// Sets the largest fraction of the sample limit one color may take,
    /// and how many distinct colors must be present for the cap to apply.
    ///
    /// The defaults are [`DEFAULT_DOMINANCE_CAP`] and [`DEFAULT_DOMINANCE_MIN_COLORS`].
    #[must_use]
    pub const fn dominance_cap(mut self, cap: f64, min_colors: usize) -> Self {
        self.dominance_cap = cap;
        self.dominance_min_colors = min_colors;
        self
    }

    /// Sets the overshoot factor. Sampling stops once the sample count exceeds
    /// `sample_limit * overshoot`.
    ///
    /// The default is [`DEFAULT_OVERSHOOT`].
    #[must_use]
    pub const fn overshoot(mut self, overshoot: f64) -> Self {
        self.overshoot = overshoot;
        self
    }

    /// Sets the mean channel value above which a color counts as a highlight.
    ///
    /// The default is [`DEFAULT_HIGHLIGHT_BRIGHTNESS`].
    #[must_use]
    pub const fn highlight_brightness(mut self, brightness: f64) -> Self {
        self.highlight_brightness = brightness;
        self
    }

    /// Sets the number of extra samples added for every highlight color.
    ///
    /// The default is [`DEFAULT_HIGHLIGHT_SAMPLES`].
    #[must_use]
    pub const fn highlight_samples(mut self, samples: u32) -> Self {
        self.highlight_samples = samples;
        self
    }
}

/// A multiset of colors stored as unique colors and their multiplicities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSet {
    /// The unique colors, in the order they were first added.
    colors: Vec<Srgb<u8>>,
    /// The multiplicity of each color.
    counts: Vec<u32>,
}

impl SampleSet {
    /// The unique sampled colors, in the order they were first added.
    #[must_use]
    pub fn colors(&self) -> &[Srgb<u8>] {
        &self.colors
    }

    /// The multiplicity of each color in [`SampleSet::colors`].
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// The number of unique colors.
    #[must_use]
    pub fn num_colors(&self) -> usize {
        self.colors.len()
    }

    /// The total number of samples, counting multiplicity.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.counts.iter().copied().map(u64::from).sum()
    }

    /// Whether the set has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns the multiplicity of `color`, or `0` if it was never sampled.
    #[must_use]
    pub fn count_of(&self, color: Srgb<u8>) -> u32 {
        self.colors
            .iter()
            .position(|&c| c == color)
            .map_or(0, |i| self.counts[i])
    }
}

/// Accumulates samples, merging repeated colors into one entry.
#[derive(Default)]
struct SampleBuilder {
    /// Index of each color in `samples`.
    index: HashMap<(u8, u8, u8), usize>,
    /// The samples so far.
    samples: SampleSet,
    /// The running number of samples.
    len: u64,
}

impl SampleBuilder {
    /// Adds `count` copies of `color`.
    fn add(&mut self, color: Srgb<u8>, count: u32) {
        if count == 0 {
            return;
        }
        let SampleSet { colors, counts } = &mut self.samples;
        match self.index.entry(color.into_components()) {
            Entry::Occupied(entry) => counts[*entry.get()] += count,
            Entry::Vacant(entry) => {
                entry.insert(colors.len());
                colors.push(color);
                counts.push(count);
            }
        }
        self.len += u64::from(count);
    }
}

/// Computes the proportional quota for one histogram entry before the overshoot check.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quota(count: u32, ratio: f64, distinct: usize, options: &SamplingOptions) -> u32 {
    let limit = f64::from(options.sample_limit);
    let mut quota = (limit * ratio) as u32;

    if options.small_region_min < count && count < options.small_region_max {
        quota = count;
    } else if count >= options.small_region_max {
        quota = quota.max(options.min_quota);
    }

    if distinct > options.dominance_min_colors {
        quota = quota.min((limit * options.dominance_cap) as u32);
    }

    quota.min(count)
}

/// Whether the mean channel value of `color` is above `brightness`.
fn is_highlight(color: Srgb<u8>, brightness: f64) -> bool {
    let (r, g, b) = color.into_components();
    (f64::from(r) + f64::from(g) + f64::from(b)) / 3.0 > brightness
}

/// Builds the clustering sample set from a filtered histogram.
///
/// Colors are visited in descending frequency order and each receives a quota
/// proportional to its share of the histogram, adjusted so that small regions are kept
/// in full, substantial colors get a minimum presence, and no single color dominates.
/// Afterwards, every highlight color receives extra samples, whether or not it was already sampled.
///
/// # Errors
/// Returns [`AnalysisError::NoSamplesAvailable`] if no samples were produced,
/// which only happens for an empty histogram.
pub fn build_samples(histogram: &ColorHistogram, options: &SamplingOptions) -> Result<SampleSet> {
    let by_frequency = histogram.by_frequency();
    let total = f64::from(histogram.total_count());
    let distinct = by_frequency.len();
    let stop = f64::from(options.sample_limit) * options.overshoot;

    let mut builder = SampleBuilder::default();

    for &(color, count) in &by_frequency {
        let ratio = f64::from(count) / total;
        builder.add(color, quota(count, ratio, distinct, options));

        #[allow(clippy::cast_precision_loss)]
        let sampled = builder.len as f64;
        if sampled > stop {
            break;
        }
    }

    let proportional = builder.len;

    for &(color, _) in &by_frequency {
        if is_highlight(color, options.highlight_brightness) {
            builder.add(color, options.highlight_samples);
        }
    }

    let samples = builder.samples;
    if samples.is_empty() {
        return Err(AnalysisError::NoSamplesAvailable);
    }

    tracing::debug!(
        samples = builder.len,
        highlight_samples = builder.len - proportional,
        unique = samples.num_colors(),
        "built sample set"
    );

    Ok(samples)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_samples() {
        let err = build_samples(&ColorHistogram::default(), &SamplingOptions::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::NoSamplesAvailable));
    }

    #[test]
    fn single_color_is_clamped_to_its_count() {
        let red = Srgb::new(255, 0, 0);
        let histogram = ColorHistogram::from_counts([(red, 10_000)]);
        let samples = build_samples(&histogram, &SamplingOptions::new()).unwrap();
        assert_eq!(samples.colors(), &[red]);
        assert_eq!(samples.len(), 10_000);
    }

    #[test]
    fn small_regions_are_taken_in_full() {
        let histogram = ColorHistogram::from_counts([
            (Srgb::new(255, 0, 0), 1_000_000),
            (Srgb::new(0, 0, 255), 300),
            (Srgb::new(0, 255, 0), 20),
        ]);
        let samples = build_samples(&histogram, &SamplingOptions::new()).unwrap();
        assert_eq!(samples.count_of(Srgb::new(0, 0, 255)), 300);
        // 20 is not a small region and its proportional quota rounds down to zero
        assert_eq!(samples.count_of(Srgb::new(0, 255, 0)), 0);
        assert_eq!(samples.num_colors(), 2);
    }

    #[test]
    fn substantial_colors_get_minimum_quota() {
        let histogram = ColorHistogram::from_counts([
            (Srgb::new(255, 0, 0), 1_000_000),
            (Srgb::new(0, 0, 255), 1000),
        ]);
        let samples = build_samples(&histogram, &SamplingOptions::new()).unwrap();
        // proportional quota would be 49
        assert_eq!(samples.count_of(Srgb::new(0, 0, 255)), 200);
    }

    #[test]
    fn dominance_cap_needs_enough_colors() {
        let dominant = Srgb::new(255, 0, 0);
        let mut colors = vec![(dominant, 1_000_000)];
        colors.extend((0..5u8).map(|i| (Srgb::new(0, i * 10, 0), 1000)));

        let capped =
            build_samples(&ColorHistogram::from_counts(colors.clone()), &SamplingOptions::new())
                .unwrap();
        assert_eq!(capped.count_of(dominant), 10_000);
        assert_eq!(capped.len(), 10_000 + 5 * 200);

        let uncapped = build_samples(
            &ColorHistogram::from_counts(colors[..5].iter().copied()),
            &SamplingOptions::new(),
        )
        .unwrap();
        assert!(uncapped.count_of(dominant) > 40_000);

        let options = SamplingOptions::new().dominance_cap(0.1, 5);
        let capped = build_samples(&ColorHistogram::from_counts(colors), &options).unwrap();
        assert_eq!(capped.count_of(dominant), 5000);
    }

    #[test]
    fn stops_after_overshoot() {
        let histogram = ColorHistogram::from_counts(
            (0..10u8).map(|i| (Srgb::new(i * 10, 0, 0), 1000)),
        );
        let options = SamplingOptions::new().sample_limit(100).dominance_cap(0.25, 5);
        let samples = build_samples(&histogram, &options).unwrap();
        // each color is capped at 25, sampling stops once the count passes 120
        assert_eq!(samples.num_colors(), 5);
        assert_eq!(samples.len(), 125);
    }

    #[test]
    fn highlights_are_boosted() {
        let red = Srgb::new(255, 0, 0);
        let white = Srgb::new(250, 250, 250);
        let histogram = ColorHistogram::from_counts([(red, 10_000), (white, 10)]);
        let samples = build_samples(&histogram, &SamplingOptions::new()).unwrap();
        assert_eq!(samples.count_of(red), 10_000);
        assert_eq!(samples.count_of(white), 110);

        let samples =
            build_samples(&histogram, &SamplingOptions::new().highlight_samples(0)).unwrap();
        assert_eq!(samples.count_of(white), 10);
    }

    #[test]
    fn highlights_skipped_by_overshoot_are_still_added() {
        let histogram = ColorHistogram::from_counts([
            (Srgb::new(255, 0, 0), 1000),
            (Srgb::new(255, 255, 255), 1),
        ]);
        let options = SamplingOptions::new().sample_limit(10);
        let samples = build_samples(&histogram, &options).unwrap();
        assert_eq!(samples.colors(), &[Srgb::new(255, 0, 0), Srgb::new(255, 255, 255)]);
        assert_eq!(samples.count_of(Srgb::new(255, 255, 255)), 100);
    }
}
