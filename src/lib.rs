//! # basc
//!
//! Bootstrap Analysis of Stable Clusters: how reliably do units (voxels,
//! regions) of a time-series dataset cluster together?
//!
//! ```text
//! subject data (time × units)
//!   └─ resample time ─ cluster ─ adjacency ─ average   → ISM   (per subject)
//!        └─ mean over subjects (± subject bootstrap)   → GSM
//!             └─ cluster GSM ─ per-cluster average     → labels + scores
//!                  └─ expand through label vector      → unit resolution
//! ```
//!
//! Everything operates on in-memory `ndarray` matrices; randomness comes
//! from explicit seeds, so every output is reproducible.
//!
//! ```rust
//! use basc::{group_stability_matrix, GsmConfig, IsmConfig};
//! use ndarray::Array2;
//!
//! // Two subjects, 50 time points, units 0-3 and 4-7 follow different signals.
//! let subject = |shift: f64| {
//!     Array2::from_shape_fn((50, 8), |(t, u)| {
//!         let t = t as f64;
//!         let base = if u < 4 { (0.8 * t).sin() } else { (0.3 * t + shift).cos() };
//!         base + 0.02 * ((u as f64 + 1.0) * t).sin()
//!     })
//! };
//!
//! let ism_config = IsmConfig::new(20, 2).with_seed(42);
//! let isms = vec![
//!     ism_config.run(subject(0.0).view(), None).unwrap().matrix,
//!     ism_config.run(subject(0.5).view(), None).unwrap().matrix,
//! ];
//!
//! let group = group_stability_matrix(&isms, &GsmConfig::new(2), None).unwrap();
//! assert_eq!(group.gsm.dim(), (8, 8));
//! assert_eq!(group.labels[0], group.labels[3]);
//! assert_ne!(group.labels[0], group.labels[4]);
//! ```

pub mod adjacency;
pub mod cluster;
/// Error types used across `basc`.
pub mod error;
pub mod expand;
pub mod metrics;
pub mod resample;
pub mod similarity;
pub mod stability;


pub use error::{Error, Result};

pub use adjacency::{adjacency_matrix, cross_adjacency};
pub use cluster::{
    assign_reference, cluster, cross_cluster, ClusterConfig, ClusterEngine, Clustering,
    HierarchicalClustering, Kmeans, Linkage, ThresholdPolicy,
};
pub use expand::{expand_labels, expand_matrix, expand_rectangular, expand_scores};
pub use metrics::ari;
pub use resample::{
    block_bootstrap_indices, bootstrap_resample, split_seed, standard_bootstrap, Resampling,
};
pub use similarity::{Correlation, Cosine, DegeneratePolicy, Similarity, SimilarityMetric};
pub use stability::{
    cluster_matrix_average, group_bootstrap_matrix, group_stability_matrix,
    individual_stability_batch, individual_stability_matrix, ism_gsm_correlation,
    join_group_stability, ClusterScores, CrossOutput, CrossResampling, DiagonalConvention,
    GroupStability, GsmConfig, IsmConfig, IsmOutput, SubjectSampler,
};
