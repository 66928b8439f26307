//! Similarity between unit time courses.
//!
//! Inputs are **units × time**: each row is one unit's time course. The
//! output of [`Similarity::between`] is `units_a × units_b`.
//!
//! ```text
//! Pearson(x, y) = ⟨x - x̄, y - ȳ⟩ / (‖x - x̄‖ ‖y - ȳ‖)
//! Cosine(x, y)  = ⟨x, y⟩ / (‖x‖ ‖y‖)
//! ```
//!
//! Both are computed as one matrix product of row-normalized inputs.
//! A row whose norm vanishes (a flat time course for Pearson) has no
//! defined similarity; [`DegeneratePolicy`] decides whether that becomes
//! zero similarity or an error. NaN never reaches a stability matrix.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Norms at or below this fraction of the raw row norm are treated as zero variance.
const DEGENERATE_EPS: f64 = 1e-12;

/// Handling of units whose similarity is undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Treat the unit as having zero similarity to every unit.
    ///
    /// Such a unit is tied with every other unit, and tie-breaking sends it
    /// to the lowest-index neighbours. Its stability row then reflects
    /// that ordering, not its signal: the ISM can report it as reliably
    /// co-clustered with low-index units. Use [`DegeneratePolicy::Reject`]
    /// when flat time courses should not reach the clustering.
    #[default]
    Substitute,
    /// Fail with [`Error::DegenerateInput`].
    Reject,
}

/// Built-in similarity metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Pearson correlation.
    #[default]
    Correlation,
    /// Cosine similarity (uncentered correlation).
    Cosine,
}

impl SimilarityMetric {
    /// Instantiate the metric with a degenerate-unit policy.
    pub fn build(self, degenerate: DegeneratePolicy) -> Box<dyn Similarity> {
        match self {
            SimilarityMetric::Correlation => Box::new(Correlation::new(degenerate)),
            SimilarityMetric::Cosine => Box::new(Cosine::new(degenerate)),
        }
    }
}

/// A unit × unit affinity.
///
/// Any metric producing a `units_a × units_b` matrix can be plugged into
/// the clustering engine and stability accumulators through this trait.
pub trait Similarity: Send + Sync {
    /// Similarity of every row of `a` to every row of `b` (both units × time).
    fn between(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Square similarity of the rows of `a` to each other.
    fn within(&self, a: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.between(a, a)
    }
}

/// Pearson correlation between time courses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Correlation {
    degenerate: DegeneratePolicy,
}

impl Correlation {
    /// Create a correlation metric with the given degenerate-unit policy.
    pub fn new(degenerate: DegeneratePolicy) -> Self {
        Self { degenerate }
    }
}

impl Similarity for Correlation {
    fn between(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        normalized_product(a, b, true, self.degenerate)
    }
}

/// Cosine similarity between time courses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine {
    degenerate: DegeneratePolicy,
}

impl Cosine {
    /// Create a cosine metric with the given degenerate-unit policy.
    pub fn new(degenerate: DegeneratePolicy) -> Self {
        Self { degenerate }
    }
}

impl Similarity for Cosine {
    fn between(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        normalized_product(a, b, false, self.degenerate)
    }
}

fn normalized_product(
    a: ArrayView2<'_, f64>,
    b: ArrayView2<'_, f64>,
    center: bool,
    degenerate: DegeneratePolicy,
) -> Result<Array2<f64>> {
    if a.nrows() == 0 || b.nrows() == 0 || a.ncols() == 0 {
        return Err(Error::EmptyInput);
    }
    if a.ncols() != b.ncols() {
        return Err(Error::shape(
            format!("{} time points", a.ncols()),
            format!("{} time points", b.ncols()),
        ));
    }

    let za = normalize_rows(a, center, degenerate)?;
    let zb = normalize_rows(b, center, degenerate)?;
    let mut sim = za.dot(&zb.t());
    sim.mapv_inplace(|v| v.clamp(-1.0, 1.0));
    Ok(sim)
}

/// Center (optionally) and scale each row to unit norm; degenerate rows become zero.
fn normalize_rows(
    x: ArrayView2<'_, f64>,
    center: bool,
    degenerate: DegeneratePolicy,
) -> Result<Array2<f64>> {
    let mut z = x.to_owned();
    for (unit, mut row) in z.axis_iter_mut(Axis(0)).enumerate() {
        let scale = row.dot(&row).sqrt();
        if center {
            let mean = row.sum() / row.len() as f64;
            row.mapv_inplace(|v| v - mean);
        }
        let norm = row.dot(&row).sqrt();
        if !norm.is_finite() || norm <= DEGENERATE_EPS * (1.0 + scale) {
            match degenerate {
                DegeneratePolicy::Reject => return Err(Error::DegenerateInput { unit }),
                DegeneratePolicy::Substitute => {
                    tracing::debug!(unit, "degenerate time course; similarity set to zero");
                    row.fill(0.0);
                }
            }
        } else {
            row.mapv_inplace(|v| v / norm);
        }
    }
    Ok(z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_correlation_signs() {
        let x = array![
            [1.0, 2.0, 3.0, 4.0],
            [2.0, 4.0, 6.0, 8.0],
            [4.0, 3.0, 2.0, 1.0],
        ];
        let sim = Correlation::default().within(x.view()).unwrap();
        assert!((sim[[0, 1]] - 1.0).abs() < 1e-12);
        assert!((sim[[0, 2]] + 1.0).abs() < 1e-12);
        for i in 0..3 {
            assert!((sim[[i, i]] - 1.0).abs() < 1e-12);
            for j in 0..3 {
                assert!((sim[[i, j]] - sim[[j, i]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_correlation_is_shift_invariant_cosine_is_not() {
        let x = array![[1.0, 2.0, 3.0], [11.0, 12.0, 13.0]];
        let corr = Correlation::default().within(x.view()).unwrap();
        let cos = Cosine::default().within(x.view()).unwrap();
        assert!((corr[[0, 1]] - 1.0).abs() < 1e-12);
        assert!(cos[[0, 1]] < 1.0 - 1e-6);
    }

    #[test]
    fn test_between_is_rectangular() {
        let a = array![[1.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        let b = array![[1.0, 0.0, -1.0], [3.0, 2.0, 1.0], [0.5, 0.1, 0.2]];
        let sim = Correlation::default().between(a.view(), b.view()).unwrap();
        assert_eq!(sim.dim(), (2, 3));
    }

    #[test]
    fn test_zero_variance_substitutes_zero() {
        let x = array![[1.0, 2.0, 3.0], [5.0, 5.0, 5.0]];
        let sim = Correlation::new(DegeneratePolicy::Substitute)
            .within(x.view())
            .unwrap();
        assert!(sim.iter().all(|v| v.is_finite()));
        assert_eq!(sim[[0, 1]], 0.0);
        assert_eq!(sim[[1, 1]], 0.0);
    }

    #[test]
    fn test_zero_variance_reject() {
        let x = array![[1.0, 2.0, 3.0], [5.0, 5.0, 5.0]];
        let result = Correlation::new(DegeneratePolicy::Reject).within(x.view());
        assert_eq!(result, Err(Error::DegenerateInput { unit: 1 }));
    }

    #[test]
    fn test_time_mismatch_is_invalid_shape() {
        let a = array![[1.0, 2.0, 3.0]];
        let b = array![[1.0, 2.0]];
        let result = Correlation::default().between(a.view(), b.view());
        assert!(matches!(result, Err(Error::InvalidShape { .. })));
    }

    #[test]
    fn test_metric_build() {
        let x = array![[1.0, 2.0, 3.0], [3.0, 1.0, 2.0]];
        let direct = Correlation::default().within(x.view()).unwrap();
        let built = SimilarityMetric::Correlation
            .build(DegeneratePolicy::Substitute)
            .within(x.view())
            .unwrap();
        assert_eq!(direct, built);
    }
}
