//! Chooses the number of ink colors by clustering the samples for a range of
//! cluster counts and picking the count at the elbow of the inertia curve.
//!
//! Clustering is done in CIELAB (D50), so the grouping follows perceptual
//! rather than raw channel distance.

use crate::{
    colorspace::{self, LabD50},
    kmeans::{self, Clustering, KmeansOptions, Point},
    ClusterCountStrategy, ColorHistogram, SampleSet,
};
use ordered_float::OrderedFloat;
use palette::{Lab, Srgb};
use std::collections::BTreeSet;

/// A color with more than this share of the histogram is significant.
pub const SIGNIFICANT_SHARE: f64 = 0.001;

/// A color with more than this many pixels is significant.
pub const SIGNIFICANT_COUNT: u32 = 50;

/// The inclusive range of cluster counts to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRange {
    /// The minimum number of clusters.
    k_min: usize,
    /// The maximum number of clusters.
    k_max: usize,
}

impl ClusterRange {
    /// Creates a new [`ClusterRange`].
    ///
    /// A `k_min` of zero is raised to one. A `k_max` below `k_min` means that only `k_min` is tried.
    #[must_use]
    pub const fn new(k_min: usize, k_max: usize) -> Self {
        let k_min = if k_min == 0 { 1 } else { k_min };
        Self { k_min, k_max }
    }

    /// The minimum number of clusters.
    #[must_use]
    pub const fn k_min(&self) -> usize {
        self.k_min
    }

    /// The maximum number of clusters.
    #[must_use]
    pub const fn k_max(&self) -> usize {
        self.k_max
    }

    /// Raises the minimum number of clusters to the number of significant colors in the histogram,
    /// capped at the maximum.
    ///
    /// A color is significant if its share of the histogram is above [`SIGNIFICANT_SHARE`]
    /// or its count is above [`SIGNIFICANT_COUNT`].
    #[must_use]
    pub fn raise_floor(self, histogram: &ColorHistogram) -> Self {
        let total = f64::from(histogram.total_count());
        let significant = histogram
            .counts()
            .iter()
            .filter(|&&count| {
                f64::from(count) / total > SIGNIFICANT_SHARE || count > SIGNIFICANT_COUNT
            })
            .count()
            .min(self.k_max);

        if significant > self.k_min {
            Self { k_min: significant, ..self }
        } else {
            self
        }
    }
}

impl Default for ClusterRange {
    fn default() -> Self {
        Self::new(2, 10)
    }
}

/// Chooses the count at the largest second difference of the inertia curve,
/// the point where adding another cluster stops paying off.
///
/// This is a heuristic. It has no optimality guarantee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elbow;

impl ClusterCountStrategy for Elbow {
    fn select(&self, k_min: usize, inertias: &[f64]) -> usize {
        let deltas = inertias.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>();
        let curvature = deltas.windows(2).map(|w| w[1] - w[0]);

        let mut elbow = None;
        for (i, c) in curvature.enumerate() {
            if elbow.map_or(true, |(_, best)| c > best) {
                elbow = Some((i, c));
            }
        }

        elbow.map_or(k_min, |(i, _)| k_min + i + 1)
    }
}

/// The chosen clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSelection {
    /// The selected number of clusters.
    pub k: usize,
    /// The cluster centers converted back to sRGB, in clustering order.
    /// Empty if there were too few samples to cluster.
    pub centroids: Vec<Srgb<u8>>,
    /// Each cluster's share of the samples. Sums to one unless `centroids` is empty.
    pub shares: Vec<f64>,
    /// The inertia for each tried count, starting at the (possibly raised) minimum.
    pub inertias: Vec<f64>,
}

impl ClusterSelection {
    /// The result when there are fewer samples than the minimum number of clusters.
    fn degenerate(k: usize) -> Self {
        Self {
            k,
            centroids: Vec::new(),
            shares: Vec::new(),
            inertias: Vec::new(),
        }
    }

    /// Whether clustering actually ran.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.centroids.is_empty()
    }
}

/// Counts the distinct points.
fn distinct_points(points: &[Point]) -> usize {
    points
        .iter()
        .map(|p| p.map(OrderedFloat))
        .collect::<BTreeSet<_>>()
        .len()
}

/// Shared implementation of [`select_k`] and [`select_k_par`].
fn select_k_with(
    samples: &SampleSet,
    range: ClusterRange,
    strategy: &dyn ClusterCountStrategy,
    lab: Vec<LabD50>,
    cluster: impl Fn(&[Point], &[u32], usize) -> Option<Clustering>,
) -> ClusterSelection {
    let k_min = range.k_min();
    let points = lab.into_iter().map(|c| [c.l, c.a, c.b]).collect::<Vec<_>>();
    let weights = samples.counts();

    let num_samples = usize::try_from(samples.len()).unwrap_or(usize::MAX);
    if num_samples < k_min {
        tracing::debug!(num_samples, k_min, "too few samples to cluster");
        return ClusterSelection::degenerate(k_min);
    }

    let effective_max = range.k_max().min(distinct_points(&points)).max(k_min);
    let upper = effective_max.min(num_samples);
    tracing::debug!(k_min, k_max = upper, "clustering sample set");

    let mut clusterings = Vec::with_capacity(upper + 1 - k_min);
    for k in k_min..=upper {
        let Some(clustering) = cluster(&points, weights, k) else {
            break;
        };
        tracing::trace!(k, inertia = clustering.inertia);
        clusterings.push(clustering);
    }

    let inertias = clusterings.iter().map(|c| c.inertia).collect::<Vec<_>>();
    let k = strategy.select(k_min, &inertias).clamp(k_min, effective_max);

    let Some(chosen) = clusterings.get(k - k_min).or(clusterings.last()) else {
        return ClusterSelection::degenerate(k_min);
    };

    tracing::debug!(k, "selected number of clusters");

    ClusterSelection {
        k,
        centroids: chosen
            .centroids
            .iter()
            .map(|&[l, a, b]| colorspace::lab_to_rgb(Lab::new(l, a, b)))
            .collect(),
        shares: chosen.shares(),
        inertias,
    }
}

/// Clusters the samples for every count in `range` and selects one with `strategy`.
///
/// The maximum count is lowered to the number of distinct sample colors (but not below the minimum).
/// If there are fewer samples than the minimum count, no clustering is done and the result
/// has no centroids.
#[must_use]
pub fn select_k(
    samples: &SampleSet,
    range: ClusterRange,
    options: &KmeansOptions,
    strategy: &dyn ClusterCountStrategy,
) -> ClusterSelection {
    let lab = colorspace::convert_to_lab(samples.colors());
    select_k_with(samples, range, strategy, lab, |points, weights, k| {
        kmeans::kmeans(points, weights, k, options)
    })
}

/// Clusters the samples in parallel. The result is identical to [`select_k`].
#[cfg(feature = "threads")]
#[must_use]
pub fn select_k_par(
    samples: &SampleSet,
    range: ClusterRange,
    options: &KmeansOptions,
    strategy: &dyn ClusterCountStrategy,
) -> ClusterSelection {
    let lab = colorspace::convert_to_lab_par(samples.colors());
    select_k_with(samples, range, strategy, lab, |points, weights, k| {
        kmeans::kmeans_par(points, weights, k, options)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{build_samples, SamplingOptions};

    #[test]
    fn elbow_picks_sharpest_bend() {
        // sharp drop between the first and second value
        assert_eq!(Elbow.select(2, &[1000.0, 100.0, 90.0, 85.0, 82.0]), 3);
        // sharp drop between the third and fourth value
        assert_eq!(Elbow.select(2, &[1000.0, 900.0, 800.0, 50.0, 40.0]), 5);
        assert_eq!(Elbow.select(4, &[500.0, 100.0, 90.0]), 5);
    }

    #[test]
    fn elbow_defaults_to_minimum() {
        assert_eq!(Elbow.select(3, &[]), 3);
        assert_eq!(Elbow.select(3, &[10.0]), 3);
        assert_eq!(Elbow.select(3, &[10.0, 5.0]), 3);
    }

    #[test]
    fn elbow_keeps_first_maximum() {
        assert_eq!(Elbow.select(2, &[10.0, 5.0, 5.0, 0.0, 0.0]), 3);
    }

    #[test]
    fn floor_raised_by_significant_colors() {
        let histogram = ColorHistogram::from_counts([
            (Srgb::new(255, 0, 0), 10_000),
            (Srgb::new(0, 255, 0), 5_000),
            (Srgb::new(0, 0, 255), 60),
            (Srgb::new(255, 255, 0), 20),
            (Srgb::new(0, 255, 255), 1),
        ]);
        // 20 / 15081 is above 0.1%, 1 / 15081 is not
        assert_eq!(ClusterRange::new(2, 10).raise_floor(&histogram).k_min(), 4);
        assert_eq!(ClusterRange::new(2, 3).raise_floor(&histogram).k_min(), 3);
        assert_eq!(ClusterRange::new(5, 10).raise_floor(&histogram).k_min(), 5);
    }

    fn samples(colors: &[(Srgb<u8>, u32)]) -> SampleSet {
        build_samples(
            &ColorHistogram::from_counts(colors.iter().copied()),
            &SamplingOptions::new(),
        )
        .unwrap()
    }

    #[test]
    fn single_color_uses_minimum() {
        let samples = samples(&[(Srgb::new(255, 0, 0), 10_000)]);
        let selection =
            select_k(&samples, ClusterRange::new(2, 10), &KmeansOptions::new(), &Elbow);
        assert_eq!(selection.k, 2);
        assert_eq!(selection.inertias.len(), 1);
        assert_eq!(selection.centroids.len(), 2);
        assert_eq!(selection.centroids[0], Srgb::new(255, 0, 0));
        assert_eq!(selection.shares, vec![1.0, 0.0]);
    }

    #[test]
    fn too_few_samples_is_degenerate() {
        let samples = samples(&[(Srgb::new(10, 20, 30), 1)]);
        let selection =
            select_k(&samples, ClusterRange::new(2, 10), &KmeansOptions::new(), &Elbow);
        assert!(selection.is_degenerate());
        assert_eq!(selection.k, 2);
    }

    #[test]
    fn shares_sum_to_one() {
        let samples = samples(&[
            (Srgb::new(255, 0, 0), 4000),
            (Srgb::new(250, 5, 5), 3000),
            (Srgb::new(0, 0, 255), 2000),
            (Srgb::new(0, 200, 0), 1000),
            (Srgb::new(240, 240, 240), 500),
        ]);
        let selection =
            select_k(&samples, ClusterRange::new(2, 10), &KmeansOptions::new(), &Elbow);
        assert!(!selection.is_degenerate());
        assert!((2..=5).contains(&selection.k));
        assert_eq!(selection.inertias.len(), 4);
        assert_eq!(selection.centroids.len(), selection.k);
        assert!((selection.shares.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[cfg(feature = "threads")]
    #[test]
    fn single_and_multi_threaded_match() {
        let samples = samples(&[
            (Srgb::new(255, 0, 0), 4000),
            (Srgb::new(0, 0, 255), 2000),
            (Srgb::new(0, 200, 0), 1000),
            (Srgb::new(30, 30, 30), 700),
        ]);
        let range = ClusterRange::new(2, 10);
        let options = KmeansOptions::new();
        assert_eq!(
            select_k(&samples, range, &options, &Elbow),
            select_k_par(&samples, range, &options, &Elbow)
        );
    }
}
