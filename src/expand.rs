//! Expansion of compressed-unit matrices back to original units.
//!
//! A label vector maps each of `n` original units to one of `m` compressed
//! units. Its one-hot **indicator** matrix `I` (n × m, `I[i, label(i)] = 1`)
//! plays the role of a structural summing matrix, and expansion is a pair
//! of products:
//!
//! ```text
//! expanded = I · M · Iᵗ          expanded[i, j] = M[label(i), label(j)]
//! ```
//!
//! No per-cell loop over the `n × n` output is ever written.

use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{Error, Result};

/// One-hot indicator matrix (`labels.len() × m`) of a label vector.
///
/// Every label must lie in `[0, m)`.
pub fn indicator_matrix(labels: &[usize], m: usize) -> Result<Array2<f64>> {
    let mut indicator = Array2::<f64>::zeros((labels.len(), m));
    for (i, &label) in labels.iter().enumerate() {
        if label >= m {
            return Err(Error::shape(
                format!("labels < {m}"),
                format!("label {label} at unit {i}"),
            ));
        }
        indicator[[i, label]] = 1.0;
    }
    Ok(indicator)
}

/// Expand a square `m × m` matrix to `n × n` using a label vector of length `n`.
///
/// ```rust
/// use basc::expand_matrix;
/// use ndarray::array;
///
/// let compressed = array![[1.0, 0.3], [0.3, 1.0]];
/// let expanded = expand_matrix(compressed.view(), &[0, 0, 1, 1, 1]).unwrap();
/// assert_eq!(expanded[[0, 1]], 1.0);
/// assert_eq!(expanded[[0, 2]], 0.3);
/// assert_eq!(expanded[[2, 4]], 1.0);
/// ```
pub fn expand_matrix(compressed: ArrayView2<'_, f64>, labels: &[usize]) -> Result<Array2<f64>> {
    let m = compressed.nrows();
    if compressed.ncols() != m {
        return Err(Error::shape(
            format!("{m}x{m} compressed matrix"),
            format!("{}x{}", m, compressed.ncols()),
        ));
    }
    expand_rectangular(compressed, labels, labels)
}

/// Expand an `m_a × m_b` matrix with one label vector per axis.
pub fn expand_rectangular(
    compressed: ArrayView2<'_, f64>,
    row_labels: &[usize],
    col_labels: &[usize],
) -> Result<Array2<f64>> {
    if row_labels.is_empty() || col_labels.is_empty() {
        return Err(Error::EmptyInput);
    }
    check_covers("rows", row_labels.len(), compressed.nrows())?;
    check_covers("columns", col_labels.len(), compressed.ncols())?;
    let rows = indicator_matrix(row_labels, compressed.nrows())?;
    let cols = indicator_matrix(col_labels, compressed.ncols())?;
    Ok(rows.dot(&compressed).dot(&cols.t()))
}

/// Compression never adds units: `n` labels cover at most `n` compressed ones.
fn check_covers(axis: &str, n_labels: usize, m: usize) -> Result<()> {
    if n_labels < m {
        return Err(Error::shape(
            format!("at least {m} labels for {m} compressed {axis}"),
            format!("{n_labels} labels"),
        ));
    }
    Ok(())
}

/// Map a clustering of compressed units onto original units.
///
/// `compressed_assignment[c]` is the cluster of compressed unit `c`; the
/// result holds the cluster of every original unit.
pub fn expand_labels(compressed_assignment: &[usize], labels: &[usize]) -> Result<Vec<usize>> {
    let m = compressed_assignment.len();
    labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            compressed_assignment.get(label).copied().ok_or_else(|| {
                Error::shape(format!("labels < {m}"), format!("label {label} at unit {i}"))
            })
        })
        .collect()
}

/// Map per-compressed-unit scores onto original units (`I · s`).
pub fn expand_scores(scores: &[f64], labels: &[usize]) -> Result<Array1<f64>> {
    let indicator = indicator_matrix(labels, scores.len())?;
    Ok(indicator.dot(&Array1::from(scores.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_expand_five_units_two_clusters() {
        let compressed = array![[1.0, 0.3], [0.3, 1.0]];
        let labels = [0, 0, 1, 1, 1];
        let expanded = expand_matrix(compressed.view(), &labels).unwrap();
        assert_eq!(expanded.dim(), (5, 5));
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(expanded[[i, j]], compressed[[labels[i], labels[j]]]);
            }
        }
        assert_eq!(expanded[[0, 1]], 1.0);
        assert_eq!(expanded[[0, 2]], 0.3);
        assert_eq!(expanded[[2, 4]], 1.0);
    }

    #[test]
    fn test_expand_identity_labels() {
        let m = array![[1.0, 0.2, 0.7], [0.2, 1.0, 0.4], [0.7, 0.4, 1.0]];
        let expanded = expand_matrix(m.view(), &[0, 1, 2]).unwrap();
        assert_eq!(expanded, m);
    }

    #[test]
    fn test_expand_rectangular() {
        let m = array![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]];
        let out = expand_rectangular(m.view(), &[1, 0, 1], &[2, 2, 0, 1]).unwrap();
        assert_eq!(out.dim(), (3, 4));
        assert_eq!(out[[0, 0]], 0.6);
        assert_eq!(out[[1, 2]], 0.1);
        assert_eq!(out[[2, 3]], 0.5);
    }

    #[test]
    fn test_expand_errors() {
        let m = array![[1.0, 0.3], [0.3, 1.0]];
        assert!(matches!(
            expand_matrix(m.view(), &[0, 2]),
            Err(Error::InvalidShape { .. })
        ));
        let rect = array![[1.0, 0.3, 0.0]];
        assert!(expand_matrix(rect.view(), &[0]).is_err());
        assert!(matches!(expand_matrix(m.view(), &[]), Err(Error::EmptyInput)));
        let three = array![[1.0, 0.2, 0.7], [0.2, 1.0, 0.4], [0.7, 0.4, 1.0]];
        assert!(matches!(
            expand_matrix(three.view(), &[0]),
            Err(Error::InvalidShape { .. })
        ));
        assert!(matches!(
            expand_rectangular(three.view(), &[0, 1, 2], &[2, 0]),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_expand_labels_and_scores() {
        let assignment = [2, 0, 1];
        assert_eq!(
            expand_labels(&assignment, &[0, 0, 1, 2, 2]).unwrap(),
            vec![2, 2, 0, 1, 1]
        );
        assert!(expand_labels(&assignment, &[3]).is_err());

        let scores = expand_scores(&[0.5, 0.9], &[1, 0, 1]).unwrap();
        assert_eq!(scores.to_vec(), vec![0.9, 0.5, 0.9]);
    }

    #[test]
    fn test_indicator_rows_are_one_hot() {
        let ind = indicator_matrix(&[1, 0, 1], 3).unwrap();
        assert_eq!(ind, array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    }
}
