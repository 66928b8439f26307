//! Partition agreement.
//!
//! Cluster ids carry no meaning across clustering calls, so partitions are
//! compared through their **contingency table**, never label by label:
//!
//! ```text
//! N = I_aᵗ · I_b          N[p, q] = |{i : a(i) = p, b(i) = q}|
//! ```
//!
//! The adjusted Rand index corrects the pair-counting agreement for
//! chance: 0 for independent partitions, 1 for identical ones.
//!
//! ```rust
//! use basc::metrics::ari;
//!
//! // Same partition, permuted ids.
//! assert!((ari(&[0, 0, 1, 1, 2], &[2, 2, 0, 0, 1]) - 1.0).abs() < 1e-12);
//! ```
//!
//! Hubert & Arabie (1985). "Comparing partitions".

use ndarray::Axis;

use crate::expand::indicator_matrix;

/// Adjusted Rand index of two partitions of the same units.
///
/// Returns 0.0 for empty or length-mismatched inputs, and 1.0 when both
/// partitions are trivial (the index is undefined there).
pub fn ari(a: &[usize], b: &[usize]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (Ok(ind_a), Ok(ind_b)) = (
        indicator_matrix(a, n_labels(a)),
        indicator_matrix(b, n_labels(b)),
    ) else {
        return 0.0;
    };

    let table = ind_a.t().dot(&ind_b);
    let pairs = |x: f64| x * (x - 1.0) / 2.0;

    let index: f64 = table.iter().map(|&c| pairs(c)).sum();
    let rows: f64 = table.sum_axis(Axis(1)).iter().map(|&c| pairs(c)).sum();
    let cols: f64 = table.sum_axis(Axis(0)).iter().map(|&c| pairs(c)).sum();
    let total = pairs(a.len() as f64);

    let expected = if total > 0.0 { rows * cols / total } else { 0.0 };
    let max_index = 0.5 * (rows + cols);
    let denom = max_index - expected;
    if denom.abs() < 1e-10 {
        return 1.0;
    }
    (index - expected) / denom
}

fn n_labels(labels: &[usize]) -> usize {
    labels.iter().copied().max().map_or(0, |m| m + 1)
}
