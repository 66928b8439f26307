//! Similarity-to-partition pipeline, single-domain and cross-domain.
//!
//! ```text
//! single:  units × time ──similarity──▶ affinity (n × n) ──engine──▶ labels
//!
//! cross:   A (n_a × time), B (n_b × time)
//!          profile = sim(A, B)                     n_a × n_b
//!          D_ij    = ‖profile_i - profile_j‖       n_a × n_a
//!          affinity = 1 - D / max(D)  ──engine──▶ labels over A
//!          B unit j → A-cluster with highest mean profile similarity
//! ```
//!
//! In cross mode only domain A is clustered; domain B serves as the
//! reference signal set. The affinity threshold (policy
//! [`ThresholdPolicy::ZeroSimilarity`]) zeroes similarities below it
//! before clustering, both on the profile and on the final affinity.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::hierarchical::{HierarchicalClustering, Linkage, DEFAULT_N_NEIGHBORS};
use super::kmeans::Kmeans;
use super::traits::Clustering;
use crate::error::{Error, Result};
use crate::expand::indicator_matrix;
use crate::similarity::{DegeneratePolicy, Similarity, SimilarityMetric};

/// Partitioning algorithm applied to an affinity matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClusterEngine {
    /// Agglomerative clustering, optionally constrained to a kNN graph.
    Hierarchical {
        /// Linkage method.
        linkage: Linkage,
        /// Connectivity neighbours; `None` is unconstrained.
        n_neighbors: Option<usize>,
    },
    /// K-means on affinity profiles.
    Kmeans {
        /// Maximum Lloyd iterations.
        max_iter: usize,
        /// Seed of the k-means++ initialization.
        seed: u64,
    },
}

impl Default for ClusterEngine {
    fn default() -> Self {
        ClusterEngine::Hierarchical {
            linkage: Linkage::Average,
            n_neighbors: Some(DEFAULT_N_NEIGHBORS),
        }
    }
}

impl ClusterEngine {
    /// Instantiate the engine for `n_clusters` clusters.
    pub fn build(&self, n_clusters: usize) -> Box<dyn Clustering> {
        match *self {
            ClusterEngine::Hierarchical {
                linkage,
                n_neighbors,
            } => Box::new(
                HierarchicalClustering::new(n_clusters)
                    .with_linkage(linkage)
                    .with_connectivity(n_neighbors),
            ),
            ClusterEngine::Kmeans { max_iter, seed } => Box::new(
                Kmeans::new(n_clusters)
                    .with_max_iter(max_iter)
                    .with_seed(seed),
            ),
        }
    }
}

/// What the affinity threshold acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Zero affinities below the threshold before clustering.
    #[default]
    ZeroSimilarity,
    /// Cluster on raw affinities; co-assignments of pairs whose similarity
    /// falls below the threshold are not counted.
    MaskAdjacency,
}

/// Configuration of the similarity & clustering step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Partitioning algorithm.
    pub engine: ClusterEngine,
    /// Similarity between unit time courses.
    pub metric: SimilarityMetric,
    /// Handling of zero-variance time courses.
    pub degenerate: DegeneratePolicy,
    /// Affinity threshold in `[0, 1]`; 0 passes everything through.
    pub affinity_threshold: f64,
    /// What the threshold acts on.
    pub threshold_policy: ThresholdPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            engine: ClusterEngine::default(),
            metric: SimilarityMetric::Correlation,
            degenerate: DegeneratePolicy::Substitute,
            affinity_threshold: 0.0,
            threshold_policy: ThresholdPolicy::ZeroSimilarity,
        }
    }
}

impl ClusterConfig {
    /// Set the partitioning algorithm.
    pub fn with_engine(mut self, engine: ClusterEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Set the similarity metric.
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the degenerate-unit policy.
    pub fn with_degenerate(mut self, degenerate: DegeneratePolicy) -> Self {
        self.degenerate = degenerate;
        self
    }

    /// Set the affinity threshold.
    pub fn with_affinity_threshold(mut self, threshold: f64) -> Self {
        self.affinity_threshold = threshold;
        self
    }

    /// Set what the affinity threshold acts on.
    pub fn with_threshold_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.threshold_policy = policy;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.affinity_threshold) {
            return Err(Error::InvalidParameter {
                name: "affinity_threshold",
                message: "must lie in [0, 1]",
            });
        }
        match self.engine {
            ClusterEngine::Hierarchical {
                n_neighbors: Some(0),
                ..
            } => Err(Error::InvalidParameter {
                name: "n_neighbors",
                message: "must be at least 1",
            }),
            ClusterEngine::Kmeans { max_iter: 0, .. } => Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            }),
            _ => Ok(()),
        }
    }

    /// The configured similarity metric.
    pub fn similarity(&self) -> Box<dyn Similarity> {
        self.metric.build(self.degenerate)
    }

    /// Copy of this configuration whose engine randomness is seeded by `seed`.
    ///
    /// Deterministic engines are returned unchanged.
    pub fn reseeded(mut self, seed: u64) -> Self {
        if let ClusterEngine::Kmeans { seed: engine_seed, .. } = &mut self.engine {
            *engine_seed = seed;
        }
        self
    }

    /// Whether co-assignments are masked by the threshold.
    pub(crate) fn masks_adjacency(&self) -> bool {
        self.threshold_policy == ThresholdPolicy::MaskAdjacency && self.affinity_threshold > 0.0
    }

    fn zero_below_threshold(&self, affinity: &mut Array2<f64>) {
        if self.threshold_policy == ThresholdPolicy::ZeroSimilarity && self.affinity_threshold > 0.0 {
            let threshold = self.affinity_threshold;
            affinity.mapv_inplace(|v| if v < threshold { 0.0 } else { v });
        }
    }
}

/// Single-domain clustering result.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Cluster label per unit.
    pub labels: Vec<usize>,
    /// Affinity the labels were computed from (after thresholding).
    pub affinity: Array2<f64>,
}

/// Cross-domain clustering result.
#[derive(Debug, Clone)]
pub struct CrossPartition {
    /// Cluster label per domain-A unit.
    pub labels: Vec<usize>,
    /// Reference cluster per domain-B unit.
    pub reference_labels: Vec<usize>,
    /// Similarity of A units to B units (after thresholding), `n_a × n_b`.
    pub profile: Array2<f64>,
}

/// Partition units into `n_clusters` clusters.
///
/// `data` is **units × time**. With `cross_reference` (also units × time,
/// same time points) the units of `data` are clustered by their similarity
/// profile against the reference units.
pub fn cluster(
    data: ArrayView2<'_, f64>,
    n_clusters: usize,
    cross_reference: Option<ArrayView2<'_, f64>>,
    config: &ClusterConfig,
) -> Result<Vec<usize>> {
    config.validate()?;
    let similarity = config.similarity();
    match cross_reference {
        None => Ok(cluster_with(similarity.as_ref(), data, n_clusters, config)?.labels),
        Some(reference) => {
            let partition =
                cross_cluster_with(similarity.as_ref(), data, reference, n_clusters, config)?;
            Ok(partition.labels)
        }
    }
}

/// Single-domain clustering with an arbitrary similarity.
pub fn cluster_with(
    similarity: &dyn Similarity,
    data: ArrayView2<'_, f64>,
    n_clusters: usize,
    config: &ClusterConfig,
) -> Result<Partition> {
    check_cluster_count(n_clusters, data.nrows())?;
    let mut affinity = similarity.within(data)?;
    config.zero_below_threshold(&mut affinity);
    let labels = config.engine.build(n_clusters).fit_affinity(affinity.view())?;
    Ok(Partition { labels, affinity })
}

/// Cross-domain clustering with the configured similarity.
pub fn cross_cluster(
    data: ArrayView2<'_, f64>,
    reference: ArrayView2<'_, f64>,
    n_clusters: usize,
    config: &ClusterConfig,
) -> Result<CrossPartition> {
    config.validate()?;
    let similarity = config.similarity();
    cross_cluster_with(similarity.as_ref(), data, reference, n_clusters, config)
}

/// Cross-domain clustering with an arbitrary similarity.
pub fn cross_cluster_with(
    similarity: &dyn Similarity,
    data: ArrayView2<'_, f64>,
    reference: ArrayView2<'_, f64>,
    n_clusters: usize,
    config: &ClusterConfig,
) -> Result<CrossPartition> {
    check_cluster_count(n_clusters, data.nrows())?;
    let mut profile = similarity.between(data, reference)?;
    config.zero_below_threshold(&mut profile);

    let mut affinity = profile_affinity(profile.view());
    config.zero_below_threshold(&mut affinity);

    let labels = config.engine.build(n_clusters).fit_affinity(affinity.view())?;
    let reference_labels = assign_reference(profile.view(), &labels, n_clusters)?;
    Ok(CrossPartition {
        labels,
        reference_labels,
        profile,
    })
}

/// Assign each reference unit (column of `profile`) to the cluster of rows
/// with the highest mean similarity. Empty clusters are skipped; ties go
/// to the lower cluster id.
pub fn assign_reference(
    profile: ArrayView2<'_, f64>,
    labels: &[usize],
    n_clusters: usize,
) -> Result<Vec<usize>> {
    if labels.len() != profile.nrows() {
        return Err(Error::shape(
            format!("{} labels", profile.nrows()),
            format!("{} labels", labels.len()),
        ));
    }
    let indicator = indicator_matrix(labels, n_clusters)?;
    let sums = indicator.t().dot(&profile);
    let counts = indicator.sum_axis(Axis(0));

    let assigned = sums
        .axis_iter(Axis(1))
        .map(|column| {
            let mut best: Option<(usize, f64)> = None;
            for (c, (&sum, &count)) in column.iter().zip(counts.iter()).enumerate() {
                if count == 0.0 {
                    continue;
                }
                let mean = sum / count;
                if best.map_or(true, |(_, m)| mean > m) {
                    best = Some((c, mean));
                }
            }
            best.map_or(0, |(c, _)| c)
        })
        .collect();
    Ok(assigned)
}

/// `1 - D / max(D)` where `D` is the Euclidean distance between profile rows.
fn profile_affinity(profile: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = profile.nrows();
    let gram = profile.dot(&profile.t());
    let mut dist = Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            (gram[[i, i]] + gram[[j, j]] - 2.0 * gram[[i, j]]).max(0.0).sqrt()
        }
    });
    let max = dist.iter().copied().fold(0.0_f64, f64::max);
    if max <= f64::EPSILON {
        return Array2::ones((n, n));
    }
    dist.mapv_inplace(|d| 1.0 - d / max);
    dist
}

pub(crate) fn check_cluster_count(n_clusters: usize, n_units: usize) -> Result<()> {
    if n_units == 0 {
        return Err(Error::EmptyInput);
    }
    if n_clusters == 0 || n_clusters > n_units {
        return Err(Error::InvalidClusterCount {
            requested: n_clusters,
            n_items: n_units,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Units × time; rows 0..3 follow one signal, rows 3..6 an orthogonal one.
    fn two_signal_units() -> Array2<f64> {
        let s1 = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let s2 = [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0];
        let noise = [0.0, 0.1, -0.1, 0.05, 0.2, -0.05, 0.15, -0.2];
        Array2::from_shape_fn((6, 8), |(u, t)| {
            let base = if u % 2 == 0 { s1[t] } else { s2[t] };
            base + noise[(t + u) % 8] * (u as f64 + 1.0) * 0.3
        })
    }

    #[test]
    fn test_cluster_single_domain() {
        let data = two_signal_units();
        let labels = cluster(data.view(), 2, None, &ClusterConfig::default()).unwrap();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[2], labels[4]);
        assert_eq!(labels[1], labels[3]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn test_cluster_kmeans_engine() {
        let data = two_signal_units();
        let config = ClusterConfig::default().with_engine(ClusterEngine::Kmeans {
            max_iter: 50,
            seed: 3,
        });
        let labels = cluster(data.view(), 2, None, &config).unwrap();
        assert_eq!(labels[0], labels[4]);
        assert_eq!(labels[1], labels[5]);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn test_cross_cluster_groups_by_profile() {
        let data = two_signal_units();
        // Reference: one clean copy of each signal.
        let reference = data.select(Axis(0), &[0, 1]);
        let partition =
            cross_cluster(data.view(), reference.view(), 2, &ClusterConfig::default()).unwrap();
        let labels = &partition.labels;
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[1], labels[3]);
        assert_ne!(labels[0], labels[1]);
        assert_eq!(partition.profile.dim(), (6, 2));
        // Reference unit 0 follows signal 1, i.e. the cluster of even units.
        assert_eq!(partition.reference_labels, vec![labels[0], labels[1]]);
    }

    #[test]
    fn test_k_equals_units_is_identity_partition() {
        let data = two_signal_units();
        let labels = cluster(data.view(), 6, None, &ClusterConfig::default()).unwrap();
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_invalid_parameters() {
        let data = two_signal_units();
        let config = ClusterConfig::default();
        assert!(matches!(
            cluster(data.view(), 0, None, &config),
            Err(Error::InvalidClusterCount { requested: 0, .. })
        ));
        assert!(matches!(
            cluster(data.view(), 7, None, &config),
            Err(Error::InvalidClusterCount { requested: 7, n_items: 6 })
        ));
        let bad = config.with_affinity_threshold(1.5);
        assert!(matches!(
            cluster(data.view(), 2, None, &bad),
            Err(Error::InvalidParameter { name: "affinity_threshold", .. })
        ));
        let bad = config.with_affinity_threshold(-0.1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_cross_time_mismatch() {
        let data = two_signal_units();
        let reference = Array2::<f64>::zeros((2, 5));
        let result = cluster(data.view(), 2, Some(reference.view()), &ClusterConfig::default());
        assert!(matches!(result, Err(Error::InvalidShape { .. })));
    }

    #[test]
    fn test_threshold_zeroes_affinity() {
        let data = two_signal_units();
        let config = ClusterConfig::default().with_affinity_threshold(0.5);
        let similarity = config.similarity();
        let partition = cluster_with(similarity.as_ref(), data.view(), 2, &config).unwrap();
        assert!(partition.affinity.iter().all(|&v| v == 0.0 || v >= 0.5));
    }

    #[test]
    fn test_assign_reference() {
        let profile = array![[0.9, 0.1, 0.5], [0.8, 0.0, 0.5], [0.1, 0.9, 0.5]];
        let labels = [1, 1, 0];
        let assigned = assign_reference(profile.view(), &labels, 2).unwrap();
        // Column 2 ties at 0.5; lower cluster id wins.
        assert_eq!(assigned, vec![1, 0, 0]);
        assert!(assign_reference(profile.view(), &[0, 1], 2).is_err());
    }

    #[test]
    fn test_profile_affinity_bounds() {
        let profile = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.1]];
        let aff = profile_affinity(profile.view());
        for i in 0..3 {
            assert_eq!(aff[[i, i]], 1.0);
            for j in 0..3 {
                assert!((0.0..=1.0).contains(&aff[[i, j]]));
                assert!((aff[[i, j]] - aff[[j, i]]).abs() < 1e-12);
            }
        }
        assert!(aff[[0, 2]] > aff[[0, 1]]);
    }
}
