//! Hierarchical (agglomerative) clustering over an affinity matrix.
//!
//! Bottom-up clustering that builds a **dendrogram** by iteratively
//! merging the closest clusters, then cuts it at exactly k clusters.
//! Dissimilarity between units is derived from the affinity:
//!
//! ```text
//! d(i, j) = max(0, 1 - (a_ij + a_ji) / 2)
//! ```
//!
//! For correlation affinities this is the usual correlation distance.
//!
//! # Linkage Methods
//!
//! | Linkage | Lance–Williams update | Effect |
//! |---------|-----------------------|--------|
//! | Single | min(d_ac, d_bc) | Chaining; elongated clusters |
//! | Complete | max(d_ac, d_bc) | Compact clusters |
//! | Average | (nₐ d_ac + n_b d_bc) / (nₐ + n_b) | Balanced compromise |
//! | Ward | ((nₐ+n_c) d_ac + (n_b+n_c) d_bc - n_c d_ab) / (nₐ+n_b+n_c) | Minimizes within-cluster variance |
//!
//! # Connectivity
//!
//! With a neighbour count set, only clusters joined by an edge of the kNN
//! graph ([`knn_connectivity`](super::connectivity::knn_connectivity)) may
//! merge. When the graph falls apart into more components than requested
//! clusters, the closest pair overall is merged instead so the cut always
//! reaches k. Without a neighbour count the unconstrained linkage is
//! delegated to `kodama`.
//!
//! Ties are broken toward the lowest cluster indices, so the result is a
//! pure function of the affinity.

use std::collections::BTreeSet;

use kodama::{linkage as kodama_linkage, Method as KodamaMethod};
use ndarray::{Array2, ArrayView2};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::connectivity::{knn_connectivity, n_components};
use super::dendrogram::Dendrogram;
use super::traits::Clustering;
use super::validate_affinity;
use crate::error::Result;

/// Default neighbour count of the connectivity graph.
pub const DEFAULT_N_NEIGHBORS: usize = 10;

/// Linkage method for hierarchical clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Single linkage: minimum distance between clusters.
    Single,
    /// Complete linkage: maximum distance between clusters.
    Complete,
    /// Average linkage: mean distance between clusters.
    #[default]
    Average,
    /// Ward's method: minimize within-cluster variance.
    Ward,
}

/// Hierarchical (agglomerative) clustering.
#[derive(Debug, Clone)]
pub struct HierarchicalClustering {
    /// Number of clusters to produce.
    n_clusters: usize,
    /// Linkage method.
    linkage: Linkage,
    /// Neighbours per unit in the connectivity graph; `None` is unconstrained.
    n_neighbors: Option<usize>,
}

impl HierarchicalClustering {
    /// Create a new hierarchical clusterer (average linkage, kNN-constrained).
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            linkage: Linkage::Average,
            n_neighbors: Some(DEFAULT_N_NEIGHBORS),
        }
    }

    /// Set linkage method.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Set the connectivity neighbour count (`None` disables the constraint).
    pub fn with_connectivity(mut self, n_neighbors: Option<usize>) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    /// Fit and return the full dendrogram (`n - 1` merges).
    pub fn fit_dendrogram(&self, affinity: ArrayView2<'_, f64>) -> Result<Dendrogram> {
        let n = validate_affinity(affinity, 1)?;
        let dist = dissimilarity(affinity);

        match self.n_neighbors {
            Some(n_neighbors) => {
                let graph = knn_connectivity(affinity, n_neighbors)?;
                let components = n_components(&graph);
                if components > 1 {
                    tracing::debug!(
                        components,
                        n_neighbors,
                        "connectivity graph is disconnected; components will be bridged"
                    );
                }
                Ok(constrained_linkage(dist, &graph, self.linkage))
            }
            None => {
                if n == 1 {
                    return Ok(Dendrogram::new(1));
                }
                // Condensed dissimilarity matrix (upper triangle, row-major).
                let mut condensed = Vec::with_capacity((n * (n - 1)) / 2);
                for row in 0..(n - 1) {
                    for col in (row + 1)..n {
                        condensed.push(dist[[row, col]]);
                    }
                }

                let method = match self.linkage {
                    Linkage::Single => KodamaMethod::Single,
                    Linkage::Complete => KodamaMethod::Complete,
                    Linkage::Average => KodamaMethod::Average,
                    Linkage::Ward => KodamaMethod::Ward,
                };

                // kodama labels leaves 0..n-1 and merge i as n+i, matching Dendrogram.
                let dend = kodama_linkage(&mut condensed, n, method);
                let mut dendro = Dendrogram::new(n);
                for step in dend.steps() {
                    dendro.add_merge(step.cluster1, step.cluster2, step.dissimilarity, step.size);
                }
                Ok(dendro)
            }
        }
    }
}

impl Clustering for HierarchicalClustering {
    fn fit_affinity(&self, affinity: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let n = validate_affinity(affinity, self.n_clusters)?;
        if self.n_clusters == n {
            return Ok((0..n).collect());
        }
        self.fit_dendrogram(affinity)?.cut_to_k(self.n_clusters)
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

/// Symmetrized `1 - affinity`, floored at zero, with a zero diagonal.
fn dissimilarity(affinity: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = affinity.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            (1.0 - 0.5 * (affinity[[i, j]] + affinity[[j, i]])).max(0.0)
        }
    })
}

/// Agglomerate along the edges of `graph`, bridging components when no edge is left.
fn constrained_linkage(
    mut d: Array2<f64>,
    graph: &UnGraph<(), f64>,
    linkage: Linkage,
) -> Dendrogram {
    let n = d.nrows();
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    // Dendrogram id currently held by each slot.
    let mut ids: Vec<usize> = (0..n).collect();
    let mut neighbors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for edge in graph.edge_references() {
        let (a, b) = (edge.source().index(), edge.target().index());
        if a != b {
            neighbors[a].insert(b);
            neighbors[b].insert(a);
        }
    }

    let mut dendro = Dendrogram::new(n);
    for step in 0..n.saturating_sub(1) {
        let pair = closest_connected(&d, &active, &neighbors).or_else(|| {
            tracing::trace!(step, "connectivity exhausted; bridging components");
            closest_any(&d, &active)
        });
        let Some((a, b, d_ab)) = pair else {
            break;
        };

        let (na, nb) = (size[a] as f64, size[b] as f64);
        for c in 0..n {
            if !active[c] || c == a || c == b {
                continue;
            }
            let nc = size[c] as f64;
            let (d_ac, d_bc) = (d[[a, c]], d[[b, c]]);
            let updated = match linkage {
                Linkage::Single => d_ac.min(d_bc),
                Linkage::Complete => d_ac.max(d_bc),
                Linkage::Average => (na * d_ac + nb * d_bc) / (na + nb),
                Linkage::Ward => {
                    let num = (na + nc) * d_ac + (nb + nc) * d_bc - nc * d_ab;
                    (num / (na + nb + nc)).max(0.0)
                }
            };
            d[[a, c]] = updated;
            d[[c, a]] = updated;
        }

        // Slot b folds into slot a.
        let moved = std::mem::take(&mut neighbors[b]);
        for c in moved {
            if c != a {
                neighbors[c].remove(&b);
                neighbors[c].insert(a);
                neighbors[a].insert(c);
            }
        }
        neighbors[a].remove(&b);
        active[b] = false;
        size[a] += size[b];

        dendro.add_merge(ids[a], ids[b], d_ab, size[a]);
        ids[a] = n + step;
    }

    dendro
}

/// Closest pair `(a, b, d)` with `a < b` joined by a connectivity edge.
fn closest_connected(
    d: &Array2<f64>,
    active: &[bool],
    neighbors: &[BTreeSet<usize>],
) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (a, adj) in neighbors.iter().enumerate() {
        if !active[a] {
            continue;
        }
        for &b in adj.range((a + 1)..) {
            let dist = d[[a, b]];
            if best.map_or(true, |(_, _, bd)| dist < bd) {
                best = Some((a, b, dist));
            }
        }
    }
    best
}

/// Closest pair `(a, b, d)` with `a < b` among all active slots.
fn closest_any(d: &Array2<f64>, active: &[bool]) -> Option<(usize, usize, f64)> {
    let n = active.len();
    let mut best: Option<(usize, usize, f64)> = None;
    for a in (0..n).filter(|&a| active[a]) {
        for b in ((a + 1)..n).filter(|&b| active[b]) {
            let dist = d[[a, b]];
            if best.map_or(true, |(_, _, bd)| dist < bd) {
                best = Some((a, b, dist));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::array;

    /// Two blocks {0,1,2} and {3,4,5}, interleaved order to defeat index bias.
    fn block_affinity() -> Array2<f64> {
        let truth = [0, 1, 0, 1, 0, 1];
        Array2::from_shape_fn((6, 6), |(i, j)| {
            if i == j {
                1.0
            } else if truth[i] == truth[j] {
                0.8 + 0.01 * (i + j) as f64
            } else {
                -0.2
            }
        })
    }

    fn assert_blocks(labels: &[usize]) {
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[2], labels[4]);
        assert_eq!(labels[1], labels[3]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn test_hierarchical_basic() {
        let hc = HierarchicalClustering::new(2).with_connectivity(Some(2));
        let labels = hc.fit_affinity(block_affinity().view()).unwrap();
        assert_blocks(&labels);
    }

    #[test]
    fn test_all_linkages_constrained_and_free() {
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            for connectivity in [Some(2), Some(5), None] {
                let labels = HierarchicalClustering::new(2)
                    .with_linkage(linkage)
                    .with_connectivity(connectivity)
                    .fit_affinity(block_affinity().view())
                    .unwrap();
                assert_blocks(&labels);
            }
        }
    }

    #[test]
    fn test_dendrogram_is_complete() {
        let hc = HierarchicalClustering::new(2);
        let dendro = hc.fit_dendrogram(block_affinity().view()).unwrap();
        assert_eq!(dendro.n_items(), 6);
        assert_eq!(dendro.n_merges(), 5);
    }

    #[test]
    fn test_disconnected_graph_still_reaches_k() {
        // With one neighbour the graph splits into pairs; k = 1 must bridge them.
        let affinity = array![
            [1.0, 0.9, 0.1, 0.0],
            [0.9, 1.0, 0.0, 0.1],
            [0.1, 0.0, 1.0, 0.9],
            [0.0, 0.1, 0.9, 1.0],
        ];
        let labels = HierarchicalClustering::new(1)
            .with_connectivity(Some(1))
            .fit_affinity(affinity.view())
            .unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0]);

        let graph = knn_connectivity(affinity.view(), 1).unwrap();
        assert_eq!(n_components(&graph), 2);
        let dendro = HierarchicalClustering::new(2)
            .with_connectivity(Some(1))
            .fit_dendrogram(affinity.view())
            .unwrap();
        assert_eq!(dendro.n_merges(), 3);
        let labels = dendro.cut_to_k(2).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_k_equals_n_is_identity() {
        let labels = HierarchicalClustering::new(6)
            .fit_affinity(block_affinity().view())
            .unwrap();
        assert_eq!(labels, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_deterministic() {
        let hc = HierarchicalClustering::new(3);
        let a = hc.fit_affinity(block_affinity().view()).unwrap();
        let b = hc.fit_affinity(block_affinity().view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_cluster_counts() {
        let aff = block_affinity();
        assert!(matches!(
            HierarchicalClustering::new(0).fit_affinity(aff.view()),
            Err(Error::InvalidClusterCount { requested: 0, .. })
        ));
        assert!(matches!(
            HierarchicalClustering::new(7).fit_affinity(aff.view()),
            Err(Error::InvalidClusterCount { requested: 7, n_items: 6 })
        ));
    }
}
