//! Weighted Lloyd's k-means with k-means++ seeding.
//!
//! Points are weighted by their multiplicity, so clustering `n` unique points gives the same
//! centroids and inertia as clustering every copy of them. Runs are fully determined by the
//! options' seed: restart `i` uses the seed `seed ^ i`, and the restart with the lowest inertia wins
//! (the earliest one on ties), so the sequential and parallel versions give identical results.

use ordered_float::OrderedFloat;
use rand::{prelude::Distribution, SeedableRng};
use rand_distr::weighted_alias::WeightedAliasIndex;
use rand_xoshiro::Xoroshiro128PlusPlus;
use serde::{Deserialize, Serialize};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// A point in three dimensional space (CIELAB components for this crate).
pub type Point = [f64; 3];

/// Options for running k-means.
///
/// # Examples
/// ```
/// # use inkmeter::KmeansOptions;
/// let options = KmeansOptions::new()
///     .restarts(4)
///     .seed(7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmeansOptions {
    /// The maximum number of Lloyd iterations per restart.
    pub(crate) max_iterations: u32,
    /// The number of independently seeded runs.
    pub(crate) restarts: u32,
    /// Convergence threshold, relative to the mean per-axis variance of the data.
    pub(crate) tolerance: f64,
    /// The seed value for the random number generator.
    pub(crate) seed: u64,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl KmeansOptions {
    /// Creates a new [`KmeansOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_iterations: 300,
            restarts: 10,
            tolerance: 1e-4,
            seed: 42,
        }
    }

    /// Sets the maximum number of iterations for each run.
    ///
    /// The default is `300`.
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the number of differently seeded runs. The run with the lowest inertia is kept.
    ///
    /// A value of `0` is treated as `1`. The default is `10`.
    #[must_use]
    pub const fn restarts(mut self, restarts: u32) -> Self {
        self.restarts = restarts;
        self
    }

    /// Sets the convergence tolerance.
    ///
    /// A run stops once the total squared centroid movement of an iteration is at most
    /// `tolerance` times the mean per-axis variance of the data.
    /// The default is `1e-4`.
    #[must_use]
    pub const fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the seed value for the random number generator.
    ///
    /// The default seed is `42`.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// The result of a k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// The final cluster centers. There are always exactly `k` of them.
    pub centroids: Vec<Point>,
    /// The total weight assigned to each centroid. Some may be zero.
    pub sizes: Vec<u64>,
    /// The weighted sum of squared distances from each point to its centroid.
    pub inertia: f64,
}

impl Clustering {
    /// The fraction of the total weight assigned to each centroid.
    #[must_use]
    pub fn shares(&self) -> Vec<f64> {
        #[allow(clippy::cast_precision_loss)]
        let total = self.sizes.iter().sum::<u64>() as f64;
        #[allow(clippy::cast_precision_loss)]
        let share = |size: u64| if total == 0.0 { 0.0 } else { size as f64 / total };
        self.sizes.iter().copied().map(share).collect()
    }
}

#[inline]
fn distance_squared(a: Point, b: Point) -> f64 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

/// Returns the index of the nearest centroid (the lowest index on ties) and its squared distance.
#[inline]
fn nearest(centroids: &[Point], point: Point) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, &centroid) in centroids.iter().enumerate() {
        let distance = distance_squared(point, centroid);
        if distance < best.1 {
            best = (i, distance);
        }
    }
    best
}

/// The mean over the three axes of the weighted variance of the points.
fn mean_variance(points: &[Point], weights: &[u32]) -> f64 {
    let total = weights.iter().copied().map(f64::from).sum::<f64>();
    if total == 0.0 {
        return 0.0;
    }

    let mut mean = [0.0; 3];
    for (point, &w) in points.iter().zip(weights) {
        for (m, &p) in mean.iter_mut().zip(point) {
            *m += f64::from(w) * p;
        }
    }
    let mean = mean.map(|m| m / total);

    let spread = points
        .iter()
        .zip(weights)
        .map(|(&point, &w)| f64::from(w) * distance_squared(point, mean))
        .sum::<f64>();

    spread / (3.0 * total)
}

/// Picks `k` initial centroids with weighted k-means++.
fn seed_centroids(
    points: &[Point],
    weights: &[u32],
    k: usize,
    rng: &mut Xoroshiro128PlusPlus,
) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);

    // weights are nonzero multiplicities, so the first draw can only fail for empty input
    let first = match WeightedAliasIndex::new(weights.iter().copied().map(u64::from).collect()) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0,
    };
    centroids.push(points[first]);

    let mut closest = points
        .iter()
        .map(|&p| distance_squared(p, points[first]))
        .collect::<Vec<_>>();

    while centroids.len() < k {
        let potentials = closest
            .iter()
            .zip(weights)
            .map(|(&d, &w)| d * f64::from(w))
            .collect();

        // fails once every point coincides with a centroid, so the rest are duplicates
        let Ok(dist) = WeightedAliasIndex::new(potentials) else {
            break;
        };

        let next = points[dist.sample(rng)];
        centroids.push(next);
        for (d, &p) in closest.iter_mut().zip(points) {
            *d = d.min(distance_squared(p, next));
        }
    }

    while centroids.len() < k {
        centroids.push(centroids[0]);
    }

    centroids
}

/// Runs Lloyd's algorithm from the given initial centroids.
fn lloyd(
    points: &[Point],
    weights: &[u32],
    mut centroids: Vec<Point>,
    max_iterations: u32,
    tolerance: f64,
) -> Clustering {
    let k = centroids.len();
    let mut sums = vec![[0.0; 3]; k];
    let mut totals = vec![0u64; k];

    for _ in 0..max_iterations {
        sums.fill([0.0; 3]);
        totals.fill(0);

        for (&point, &w) in points.iter().zip(weights) {
            let (i, _) = nearest(&centroids, point);
            for (s, p) in sums[i].iter_mut().zip(point) {
                *s += f64::from(w) * p;
            }
            totals[i] += u64::from(w);
        }

        let mut shift = 0.0;
        for ((centroid, sum), &total) in centroids.iter_mut().zip(&sums).zip(&totals) {
            // empty clusters keep their previous center
            if total > 0 {
                #[allow(clippy::cast_precision_loss)]
                let total = total as f64;
                let updated = sum.map(|s| s / total);
                shift += distance_squared(*centroid, updated);
                *centroid = updated;
            }
        }

        if shift <= tolerance {
            break;
        }
    }

    let mut sizes = vec![0u64; k];
    let mut inertia = 0.0;
    for (&point, &w) in points.iter().zip(weights) {
        let (i, distance) = nearest(&centroids, point);
        sizes[i] += u64::from(w);
        inertia += f64::from(w) * distance;
    }

    Clustering { centroids, sizes, inertia }
}

/// Runs a single seeded restart.
fn run(
    points: &[Point],
    weights: &[u32],
    k: usize,
    tolerance: f64,
    max_iterations: u32,
    seed: u64,
) -> Clustering {
    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
    let centroids = seed_centroids(points, weights, k, rng);
    lloyd(points, weights, centroids, max_iterations, tolerance)
}

/// Returns the run with the lowest inertia, keeping the earliest on ties.
fn best(runs: impl IntoIterator<Item = Clustering>) -> Option<Clustering> {
    runs.into_iter()
        .enumerate()
        .min_by_key(|(i, run)| (OrderedFloat(run.inertia), *i))
        .map(|(_, run)| run)
}

/// Validates inputs shared by [`kmeans`] and [`kmeans_par`].
fn check(points: &[Point], weights: &[u32], k: usize) -> bool {
    k > 0 && !points.is_empty() && points.len() == weights.len()
}

/// Clusters `points`, each weighted by the corresponding entry in `weights`, into `k` groups.
///
/// `k` may exceed the number of points. The extra centroids duplicate an existing one
/// and receive no weight.
///
/// Returns `None` if `k` is zero, `points` is empty, or `weights` has a different length than `points`.
#[must_use]
pub fn kmeans(
    points: &[Point],
    weights: &[u32],
    k: usize,
    options: &KmeansOptions,
) -> Option<Clustering> {
    if !check(points, weights, k) {
        return None;
    }

    let tolerance = options.tolerance * mean_variance(points, weights);
    let restarts = u64::from(options.restarts.max(1));

    best((0..restarts).map(|i| {
        run(points, weights, k, tolerance, options.max_iterations, options.seed ^ i)
    }))
}

/// Clusters `points` in parallel, running the restarts concurrently.
/// The result is identical to [`kmeans`].
#[cfg(feature = "threads")]
#[must_use]
pub fn kmeans_par(
    points: &[Point],
    weights: &[u32],
    k: usize,
    options: &KmeansOptions,
) -> Option<Clustering> {
    if !check(points, weights, k) {
        return None;
    }

    let tolerance = options.tolerance * mean_variance(points, weights);
    let restarts = u64::from(options.restarts.max(1));

    let runs = (0..restarts)
        .into_par_iter()
        .map(|i| run(points, weights, k, tolerance, options.max_iterations, options.seed ^ i))
        .collect::<Vec<_>>();

    best(runs)
}
