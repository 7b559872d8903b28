use std::fmt::Debug;

/// A model selection criterion that picks the number of clusters from a fit-quality curve.
///
/// `inertias[i]` is the inertia of the best clustering with `k_min + i` clusters.
/// Implementations return the chosen number of clusters. Out of range values are clamped by the caller.
///
/// The default criterion is [`Elbow`](crate::Elbow).
pub trait ClusterCountStrategy: Debug + Send + Sync {
    /// Chooses the number of clusters.
    fn select(&self, k_min: usize, inertias: &[f64]) -> usize;
}
