//! Co-assignment (adjacency) matrices of hard partitions.
//!
//! `A[i, j] = 1` iff units i and j carry the same cluster id. Only
//! co-assignment is ever compared across clustering calls, so label
//! numbering never matters.
//!
//! Both forms are indicator products:
//!
//! ```text
//! single  A = I · Iᵗ           n × n, diagonal 1
//! cross   A = I_a · I_bᵗ       n_a × n_b
//! ```

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};
use crate::expand::indicator_matrix;

/// Co-assignment matrix of one partition.
pub fn adjacency_matrix(labels: &[usize]) -> Result<Array2<f64>> {
    if labels.is_empty() {
        return Err(Error::EmptyInput);
    }
    let indicator = indicator_matrix(labels, n_labels(labels))?;
    Ok(indicator.dot(&indicator.t()))
}

/// Rectangular co-assignment of two unit sets sharing one label space.
pub fn cross_adjacency(labels_a: &[usize], labels_b: &[usize]) -> Result<Array2<f64>> {
    if labels_a.is_empty() || labels_b.is_empty() {
        return Err(Error::EmptyInput);
    }
    let k = n_labels(labels_a).max(n_labels(labels_b));
    let a = indicator_matrix(labels_a, k)?;
    let b = indicator_matrix(labels_b, k)?;
    Ok(a.dot(&b.t()))
}

/// Zero co-assignments whose similarity falls below `threshold`; the
/// diagonal of a square adjacency stays 1.
pub(crate) fn mask_below(
    adjacency: &mut Array2<f64>,
    similarity: ArrayView2<'_, f64>,
    threshold: f64,
) {
    ndarray::Zip::from(&mut *adjacency)
        .and(&similarity)
        .for_each(|a, &s| {
            if s < threshold {
                *a = 0.0;
            }
        });
    if adjacency.is_square() {
        adjacency.diag_mut().fill(1.0);
    }
}

fn n_labels(labels: &[usize]) -> usize {
    labels.iter().copied().max().map_or(0, |m| m + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_adjacency_basic() {
        let adj = adjacency_matrix(&[0, 1, 0, 2]).unwrap();
        assert_eq!(
            adj,
            array![
                [1.0, 0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [1.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        );
    }

    #[test]
    fn test_adjacency_ignores_label_numbering() {
        let a = adjacency_matrix(&[0, 0, 1, 1, 2]).unwrap();
        let b = adjacency_matrix(&[5, 5, 3, 3, 0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cross_adjacency_shape() {
        let adj = cross_adjacency(&[0, 1, 1], &[1, 0]).unwrap();
        assert_eq!(adj, array![[0.0, 1.0], [1.0, 0.0], [1.0, 0.0]]);
        assert!(matches!(cross_adjacency(&[], &[0]), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_mask_keeps_diagonal() {
        let mut adj = adjacency_matrix(&[0, 0, 0]).unwrap();
        let sim = array![[1.0, 0.9, 0.1], [0.9, 1.0, 0.2], [0.1, 0.2, 1.0]];
        mask_below(&mut adj, sim.view(), 0.5);
        assert_eq!(adj, array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }
}
