//! K-means clustering of affinity profiles.
//!
//! Each unit is represented by its row of the affinity matrix (its
//! similarity profile against every unit), and the profiles are
//! partitioned by minimizing **within-cluster sum of squares**:
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! Lloyd iterations from a k-means++ start. Unlike the hierarchical
//! engine this one is randomized; the seed is mandatory, so the result
//! is still a pure function of (affinity, seed).

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::traits::Clustering;
use super::validate_affinity;
use crate::error::{Error, Result};

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance.
    tol: f64,
    /// Random seed.
    seed: u64,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 100,
            tol: 1e-6,
            seed: 0,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Cluster the rows of `points` (n × d).
    pub fn fit_points(&self, points: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let n = points.nrows();
        let d = points.ncols();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut centroids = self.init_centroids(points, &mut rng);
        let mut labels = vec![0usize; n];

        for _iter in 0..self.max_iter {
            // Assignment step - parallel when feature enabled
            #[cfg(feature = "parallel")]
            {
                let centroids_ref = &centroids;
                labels.par_iter_mut().enumerate().for_each(|(i, label)| {
                    *label = nearest(points.row(i), centroids_ref);
                });
            }

            #[cfg(not(feature = "parallel"))]
            for (i, label) in labels.iter_mut().enumerate() {
                *label = nearest(points.row(i), &centroids);
            }

            // Update step
            let mut new_centroids = Array2::<f64>::zeros((self.k, d));
            let mut counts = vec![0usize; self.k];
            for (i, &c) in labels.iter().enumerate() {
                let mut row = new_centroids.row_mut(c);
                row += &points.row(i);
                counts[c] += 1;
            }

            for (c, &count) in counts.iter().enumerate() {
                if count > 0 {
                    new_centroids.row_mut(c).mapv_inplace(|v| v / count as f64);
                } else {
                    // Empty cluster: reinitialize randomly
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(c).assign(&points.row(idx));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();

            centroids = new_centroids;

            if shift < self.tol {
                break;
            }
        }

        // Final assignment against the converged centroids.
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest(points.row(i), &centroids);
        }
        Ok(labels)
    }

    /// Initialize centroids using k-means++ algorithm.
    fn init_centroids(&self, data: ArrayView2<'_, f64>, rng: &mut impl Rng) -> Array2<f64> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((self.k, data.ncols()));

        // First centroid: random point
        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        // Remaining centroids: k-means++ selection
        for i in 1..self.k {
            let distances: Vec<f64> = (0..n)
                .map(|j| {
                    (0..i)
                        .map(|c| squared_distance(data.row(j), centroids.row(c)))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            // Sample proportional to squared distance
            let total: f64 = distances.iter().sum();
            if total == 0.0 {
                let idx = rng.random_range(0..n);
                centroids.row_mut(i).assign(&data.row(idx));
                continue;
            }

            let threshold = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            let mut selected = n - 1;
            for (j, &dist) in distances.iter().enumerate() {
                cumsum += dist;
                if cumsum >= threshold {
                    selected = j;
                    break;
                }
            }

            centroids.row_mut(i).assign(&data.row(selected));
        }

        centroids
    }
}

impl Clustering for Kmeans {
    fn fit_affinity(&self, affinity: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let n = validate_affinity(affinity, self.k)?;
        if self.k == n {
            return Ok((0..n).collect());
        }
        self.fit_points(affinity)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f64::MAX;
    for (k, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = k;
        }
    }
    best_cluster
}
