//! Per-cluster stability scores and ISM–GSM agreement.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expand::indicator_matrix;

/// Whether self-stability entries enter a cluster's average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagonalConvention {
    /// Average over pairs `i ≠ j`; singleton clusters score 0.
    #[default]
    Exclude,
    /// Average over all `n_c²` entries of the cluster block.
    Include,
}

/// Per-cluster average stability and its unit-resolution forms.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterScores {
    /// One score per cluster id.
    pub cluster_scores: Vec<f64>,
    /// `k × n`: row c holds cluster c's score on its members, 0 elsewhere.
    pub score_map: Array2<f64>,
    /// Score of each unit's cluster.
    pub unit_scores: Array1<f64>,
}

/// Average `matrix` within each cluster of `labels`.
///
/// Block sums come from `Iᵗ · M · I`; empty clusters score 0.
pub fn cluster_matrix_average(
    matrix: ArrayView2<'_, f64>,
    labels: &[usize],
    convention: DiagonalConvention,
) -> Result<ClusterScores> {
    let n = matrix.nrows();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    if matrix.ncols() != n || labels.len() != n {
        return Err(Error::shape(
            format!("{n}x{n} matrix with {n} labels"),
            format!("{}x{} matrix with {} labels", n, matrix.ncols(), labels.len()),
        ));
    }

    let k = labels.iter().copied().max().map_or(0, |m| m + 1);
    let indicator = indicator_matrix(labels, k)?;
    let block_sums = indicator.t().dot(&matrix).dot(&indicator);
    let diag_sums = indicator.t().dot(&matrix.diag());
    let sizes = indicator.sum_axis(Axis(0));

    let cluster_scores: Vec<f64> = (0..k)
        .map(|c| {
            let size = sizes[c];
            match convention {
                DiagonalConvention::Include if size > 0.0 => block_sums[[c, c]] / (size * size),
                DiagonalConvention::Exclude if size > 1.0 => {
                    (block_sums[[c, c]] - diag_sums[c]) / (size * (size - 1.0))
                }
                _ => 0.0,
            }
        })
        .collect();

    let scores = Array1::from(cluster_scores.clone());
    let unit_scores = indicator.dot(&scores);
    let mut score_map = indicator.t().to_owned();
    for (mut row, &score) in score_map.axis_iter_mut(Axis(0)).zip(scores.iter()) {
        row *= score;
    }

    Ok(ClusterScores {
        cluster_scores,
        score_map,
        unit_scores,
    })
}

/// Pearson correlation between each ISM and the GSM over the off-diagonal
/// upper triangle. A constant triangle correlates as 0.
pub fn ism_gsm_correlation(isms: &[Array2<f64>], gsm: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
    let n = gsm.nrows();
    if isms.is_empty() || n == 0 {
        return Err(Error::EmptyInput);
    }
    if gsm.ncols() != n {
        return Err(Error::shape(
            format!("{n}x{n} group matrix"),
            format!("{}x{}", n, gsm.ncols()),
        ));
    }
    let reference = upper_triangle(gsm);
    isms.iter()
        .map(|ism| {
            if ism.dim() != (n, n) {
                return Err(Error::shape(
                    format!("{n}x{n} stability matrix"),
                    format!("{}x{}", ism.nrows(), ism.ncols()),
                ));
            }
            Ok(pearson(&upper_triangle(ism.view()), &reference))
        })
        .collect()
}

fn upper_triangle(m: ArrayView2<'_, f64>) -> Vec<f64> {
    let n = m.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(m[[i, j]]);
        }
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let len = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / len;
    let mean_b = b.iter().sum::<f64>() / len;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn stability() -> Array2<f64> {
        array![
            [1.0, 0.8, 0.6, 0.1],
            [0.8, 1.0, 0.4, 0.2],
            [0.6, 0.4, 1.0, 0.0],
            [0.1, 0.2, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_scores_exclude_diagonal() {
        let s = cluster_matrix_average(stability().view(), &[0, 0, 0, 1], DiagonalConvention::Exclude)
            .unwrap();
        assert!((s.cluster_scores[0] - 0.6).abs() < 1e-12);
        assert_eq!(s.cluster_scores[1], 0.0);
        let a = s.cluster_scores[0];
        assert_eq!(s.unit_scores.to_vec(), vec![a, a, a, 0.0]);
    }

    #[test]
    fn test_scores_include_diagonal() {
        let s = cluster_matrix_average(stability().view(), &[0, 0, 0, 1], DiagonalConvention::Include)
            .unwrap();
        // (3 + 2 * (0.8 + 0.6 + 0.4)) / 9
        assert!((s.cluster_scores[0] - 6.6 / 9.0).abs() < 1e-12);
        assert_eq!(s.cluster_scores[1], 1.0);
    }

    #[test]
    fn test_score_map_layout() {
        let s = cluster_matrix_average(stability().view(), &[1, 0, 1, 0], DiagonalConvention::Exclude)
            .unwrap();
        assert_eq!(s.score_map.dim(), (2, 4));
        assert!((s.score_map[[0, 1]] - 0.2).abs() < 1e-12);
        assert!((s.score_map[[0, 3]] - 0.2).abs() < 1e-12);
        assert_eq!(s.score_map[[0, 0]], 0.0);
        assert!((s.score_map[[1, 2]] - 0.6).abs() < 1e-12);
        assert_eq!(s.score_map[[1, 3]], 0.0);
    }

    #[test]
    fn test_scores_shape_errors() {
        let m = stability();
        assert!(cluster_matrix_average(m.view(), &[0, 1], DiagonalConvention::Exclude).is_err());
        let empty = Array2::<f64>::zeros((0, 0));
        assert!(matches!(
            cluster_matrix_average(empty.view(), &[], DiagonalConvention::Exclude),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn test_ism_gsm_correlation() {
        let gsm = stability();
        let same = gsm.clone();
        let flipped = gsm.mapv(|v| 1.0 - v);
        let flat = Array2::<f64>::ones((4, 4));
        let corr = ism_gsm_correlation(&[same, flipped, flat], gsm.view()).unwrap();
        assert!((corr[0] - 1.0).abs() < 1e-12);
        assert!((corr[1] + 1.0).abs() < 1e-12);
        assert_eq!(corr[2], 0.0);
        let wrong = Array2::<f64>::ones((3, 3));
        assert!(ism_gsm_correlation(&[wrong], gsm.view()).is_err());
    }
}
