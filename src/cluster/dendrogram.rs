//! Dendrogram produced by agglomerative clustering.
//!
//! A dendrogram represents the nested structure of clusters produced
//! by agglomerative (bottom-up) clustering. Cluster ids follow the
//! SciPy/MATLAB convention: leaves are `0..n`, merge `i` creates `n + i`.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A dendrogram representing hierarchical cluster merges.
///
/// Each merge combines two clusters into one, recording:
/// - Which clusters were merged
/// - The dissimilarity at which they merged
/// - The size of the resulting cluster
#[derive(Debug, Clone)]
pub struct Dendrogram {
    merges: Vec<Merge>,
    n_items: usize,
}

/// A single merge operation in the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// First cluster being merged (id).
    pub cluster_a: usize,
    /// Second cluster being merged (id).
    pub cluster_b: usize,
    /// Dissimilarity at which the merge occurred.
    pub distance: f64,
    /// Size of resulting cluster.
    pub size: usize,
}

impl Dendrogram {
    /// Create a new dendrogram for n items.
    pub fn new(n_items: usize) -> Self {
        Self {
            merges: Vec::with_capacity(n_items.saturating_sub(1)),
            n_items,
        }
    }

    /// Record a merge operation.
    pub fn add_merge(&mut self, cluster_a: usize, cluster_b: usize, distance: f64, size: usize) {
        self.merges.push(Merge {
            cluster_a,
            cluster_b,
            distance,
            size,
        });
    }

    /// Get cluster assignments for k clusters.
    ///
    /// Replays the first `n - k` merges in recorded order. Merge order, not
    /// merge height, decides the cut, so linkages with inversions (constrained
    /// or Ward-style updates) still yield exactly `k` clusters.
    ///
    /// Labels are numbered by first appearance, so unit 0 is always in cluster 0.
    pub fn cut_to_k(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_items;
        if k == 0 || k > n {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }

        let needed = n - k;
        if self.merges.len() < needed {
            return Err(Error::Other(format!(
                "dendrogram records {} merges, {} needed for {} clusters",
                self.merges.len(),
                needed,
                k
            )));
        }

        let mut parent: Vec<usize> = (0..n + needed).collect();
        for (step, merge) in self.merges.iter().take(needed).enumerate() {
            let id = n + step;
            if merge.cluster_a >= id || merge.cluster_b >= id {
                return Err(Error::Other(format!(
                    "merge {step} references cluster not yet created"
                )));
            }
            let a = find_root(&mut parent, merge.cluster_a);
            let b = find_root(&mut parent, merge.cluster_b);
            parent[a] = id;
            parent[b] = id;
        }

        let mut relabel: HashMap<usize, usize> = HashMap::with_capacity(k);
        let mut labels = Vec::with_capacity(n);
        for item in 0..n {
            let root = find_root(&mut parent, item);
            let next = relabel.len();
            labels.push(*relabel.entry(root).or_insert(next));
        }
        Ok(labels)
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Iterate over merges.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }
}

fn find_root(parent: &mut [usize], mut x: usize) -> usize {
    let mut root = x;
    while parent[root] != root {
        root = parent[root];
    }
    while parent[x] != root {
        let next = parent[x];
        parent[x] = root;
        x = next;
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_leaf() -> Dendrogram {
        let mut dendro = Dendrogram::new(4);
        dendro.add_merge(0, 1, 0.5, 2);
        dendro.add_merge(2, 3, 0.7, 2);
        dendro.add_merge(4, 5, 1.0, 4); // clusters from previous merges
        dendro
    }

    #[test]
    fn test_dendrogram_creation() {
        let dendro = Dendrogram::new(5);
        assert_eq!(dendro.n_items(), 5);
        assert_eq!(dendro.n_merges(), 0);
    }

    #[test]
    fn test_cut_to_k() {
        let dendro = four_leaf();
        assert_eq!(dendro.n_merges(), 3);
        assert_eq!(dendro.cut_to_k(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(dendro.cut_to_k(3).unwrap(), vec![0, 0, 1, 2]);
        assert_eq!(dendro.cut_to_k(2).unwrap(), vec![0, 0, 1, 1]);
        assert_eq!(dendro.cut_to_k(1).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_cut_ignores_inverted_heights() {
        // Second merge is lower than the first; order still decides.
        let mut dendro = Dendrogram::new(3);
        dendro.add_merge(1, 2, 0.9, 2);
        dendro.add_merge(0, 3, 0.4, 3);
        assert_eq!(dendro.cut_to_k(2).unwrap(), vec![0, 1, 1]);
    }

    #[test]
    fn test_cut_invalid_k() {
        let dendro = four_leaf();
        assert!(matches!(
            dendro.cut_to_k(0),
            Err(Error::InvalidClusterCount { requested: 0, .. })
        ));
        assert!(dendro.cut_to_k(5).is_err());
    }

    #[test]
    fn test_cut_missing_merges() {
        let mut dendro = Dendrogram::new(3);
        dendro.add_merge(0, 1, 0.1, 2);
        assert!(dendro.cut_to_k(2).is_ok());
        assert!(dendro.cut_to_k(1).is_err());
    }
}
