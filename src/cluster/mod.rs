//! Clustering of units from their pairwise affinity.
//!
//! Every engine consumes a square **affinity** matrix (higher = more
//! similar) and returns one hard label per unit, numbered `0..k`:
//!
//! ```text
//! units × time ──similarity──▶ affinity (n × n) ──Clustering──▶ labels
//! ```
//!
//! ## Engines
//!
//! ### Hierarchical (default)
//!
//! Agglomerative clustering on `1 - affinity`, cut at exactly k clusters.
//! By default merges are restricted to the edges of a kNN graph over the
//! affinity (10 neighbours), which yields contiguous, deterministic
//! parcellations. Disabling the constraint delegates to `kodama`.
//!
//! ### K-means
//!
//! Lloyd iterations on the affinity rows (each unit's similarity profile),
//! seeded k-means++. Faster on large unit counts, randomized through an
//! explicit seed.
//!
//! ## Usage
//!
//! ```rust
//! use basc::cluster::{cluster, ClusterConfig};
//! use ndarray::array;
//!
//! // 4 units × 6 time points
//! let data = array![
//!     [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
//!     [1.1, 2.1, 2.9, 4.2, 5.0, 6.1],
//!     [6.0, 5.0, 4.0, 3.0, 2.0, 1.0],
//!     [5.9, 5.1, 4.0, 2.8, 2.1, 1.0],
//! ];
//! let labels = cluster(data.view(), 2, None, &ClusterConfig::default()).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_eq!(labels[2], labels[3]);
//! assert_ne!(labels[0], labels[2]);
//! ```

use ndarray::ArrayView2;

use crate::error::{Error, Result};

mod connectivity;
mod dendrogram;
mod engine;
mod hierarchical;
mod kmeans;
mod traits;

pub use connectivity::{knn_connectivity, n_components};
pub use dendrogram::{Dendrogram, Merge};
pub use engine::{
    assign_reference, cluster, cluster_with, cross_cluster, cross_cluster_with, ClusterConfig,
    ClusterEngine, CrossPartition, Partition, ThresholdPolicy,
};
pub use hierarchical::{HierarchicalClustering, Linkage, DEFAULT_N_NEIGHBORS};
pub use kmeans::Kmeans;
pub use traits::Clustering;

pub(crate) use engine::check_cluster_count;

/// Check that `affinity` is a non-empty square matrix admitting `k` clusters.
/// Returns the number of units.
pub(crate) fn validate_affinity(affinity: ArrayView2<'_, f64>, k: usize) -> Result<usize> {
    let n = affinity.nrows();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    if affinity.ncols() != n {
        return Err(Error::shape(
            format!("{n}x{n} affinity"),
            format!("{}x{} affinity", n, affinity.ncols()),
        ));
    }
    if k == 0 || k > n {
        return Err(Error::InvalidClusterCount {
            requested: k,
            n_items: n,
        });
    }
    Ok(n)
}
