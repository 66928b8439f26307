//! kNN connectivity graph over a precomputed affinity.
//!
//! Constrained agglomeration only merges clusters joined by an edge of
//! this graph, which keeps clusters spatially/functionally contiguous:
//!
//! ```text
//! affinity (n × n) → top-k neighbours per unit → undirected kNN graph
//! ```
//!
//! The graph is symmetric: if j is among i's neighbours, the edge i–j
//! exists regardless of whether i is among j's. Edge weights are the
//! (symmetrized) affinities.
//!
//! Neighbour search is brute force, O(n² log n); the affinity matrix is
//! already dense so nothing is gained from an ANN index.

use ndarray::ArrayView2;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::error::{Error, Result};

/// Build the symmetric kNN graph of `affinity` (higher = closer).
///
/// `n_neighbors` is clamped to `n - 1`. Ties break toward the lower index.
pub fn knn_connectivity(
    affinity: ArrayView2<'_, f64>,
    n_neighbors: usize,
) -> Result<UnGraph<(), f64>> {
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
    if n_neighbors == 0 {
        return Err(Error::InvalidParameter {
            name: "n_neighbors",
            message: "must be at least 1",
        });
    }

    let k = n_neighbors.min(n - 1);
    let mut graph = UnGraph::<(), f64>::with_capacity(n, n * k);
    let nodes: Vec<NodeIndex> = (0..n).map(|_| graph.add_node(())).collect();

    let mut order: Vec<usize> = Vec::with_capacity(n);
    for i in 0..n {
        order.clear();
        order.extend((0..n).filter(|&j| j != i));
        order.sort_by(|&x, &y| {
            affinity[[i, y]]
                .partial_cmp(&affinity[[i, x]])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.cmp(&y))
        });

        for &j in order.iter().take(k) {
            let weight = 0.5 * (affinity[[i, j]] + affinity[[j, i]]);
            // update_edge keeps a single edge per unordered pair
            graph.update_edge(nodes[i], nodes[j], weight);
        }
    }

    Ok(graph)
}

/// Number of connected components of a connectivity graph.
pub fn n_components(graph: &UnGraph<(), f64>) -> usize {
    petgraph::algo::connected_components(graph)
}
