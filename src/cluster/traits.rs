//! Clustering traits.

use ndarray::ArrayView2;

use crate::error::Result;

/// Trait for clustering algorithms over a precomputed affinity.
pub trait Clustering {
    /// Partition units given a square affinity matrix (higher = more similar).
    ///
    /// Returns a vector of cluster labels in `[0, k)`, one per unit. Label
    /// numbering carries no meaning across calls; compare co-assignment only.
    fn fit_affinity(&self, affinity: ArrayView2<'_, f64>) -> Result<Vec<usize>>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;
}
