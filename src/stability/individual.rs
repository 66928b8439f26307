//! Individual stability matrices (ISM).

use std::time::{Duration, Instant};

use ndarray::{Array2, ArrayView2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{batch_size, sum_replicates, with_workers};
use crate::adjacency::{adjacency_matrix, cross_adjacency, mask_below};
use crate::cluster::{check_cluster_count, cluster_with, cross_cluster_with, ClusterConfig};
use crate::error::{Error, Result};
use crate::resample::{split_seed, Resampling};
use crate::similarity::Similarity;

/// How the two domains are resampled in cross mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossResampling {
    /// Each domain draws its own rows.
    ///
    /// The two resampled series no longer share time points, so profile
    /// similarities between domains drift toward zero and rectangular
    /// entries toward chance. Use [`CrossResampling::Paired`] when the
    /// domains were recorded on a common clock.
    #[default]
    Independent,
    /// Both domains share one row draw.
    Paired,
}

/// Shape of the cross-mode stability matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossOutput {
    /// `n_a × n_b`: A unit i and B unit j co-occur when j's reference
    /// cluster is i's cluster.
    #[default]
    Rectangular,
    /// `n_a × n_a`: co-assignment of A units clustered against B.
    Source,
}

/// Configuration of an ISM run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsmConfig {
    /// Bootstrap replicates.
    pub n_bootstraps: usize,
    /// Clusters per replicate.
    pub n_clusters: usize,
    /// Time-point resampling strategy.
    pub resampling: Resampling,
    /// Cross-mode resampling of the second domain.
    pub cross_resampling: CrossResampling,
    /// Cross-mode output shape.
    pub cross_output: CrossOutput,
    /// Base seed; iteration `i` uses `split_seed(seed, i)`.
    pub seed: u64,
    /// Dedicated worker threads; `None` uses the ambient pool.
    pub workers: Option<usize>,
    /// Stop scheduling new replicates after this much wall time.
    pub time_budget: Option<Duration>,
    /// Similarity & clustering step.
    pub cluster: ClusterConfig,
}

impl Default for IsmConfig {
    fn default() -> Self {
        Self {
            n_bootstraps: 100,
            n_clusters: 10,
            resampling: Resampling::default(),
            cross_resampling: CrossResampling::default(),
            cross_output: CrossOutput::default(),
            seed: 0,
            workers: None,
            time_budget: None,
            cluster: ClusterConfig::default(),
        }
    }
}

/// Result of an ISM run.
#[derive(Debug, Clone)]
pub struct IsmOutput {
    /// Stability matrix.
    pub matrix: Array2<f64>,
    /// Replicates actually averaged (fewer than requested when the time
    /// budget ran out).
    pub n_bootstraps: usize,
}

impl IsmConfig {
    /// Config with the given replicate and cluster counts.
    pub fn new(n_bootstraps: usize, n_clusters: usize) -> Self {
        Self {
            n_bootstraps,
            n_clusters,
            ..Self::default()
        }
    }

    /// Set the resampling strategy.
    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    /// Set cross-mode resampling.
    pub fn with_cross_resampling(mut self, cross_resampling: CrossResampling) -> Self {
        self.cross_resampling = cross_resampling;
        self
    }

    /// Set cross-mode output shape.
    pub fn with_cross_output(mut self, cross_output: CrossOutput) -> Self {
        self.cross_output = cross_output;
        self
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run on a dedicated pool of `workers` threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Cap wall time.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Set the similarity & clustering step.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_bootstraps == 0 {
            return Err(Error::InvalidParameter {
                name: "n_bootstraps",
                message: "must be at least 1",
            });
        }
        self.cluster.validate()
    }

    /// Compute the ISM of `data` (time × units), or the cross-mode matrix
    /// against `cross_data` (time × units of domain B).
    pub fn run(
        &self,
        data: ArrayView2<'_, f64>,
        cross_data: Option<ArrayView2<'_, f64>>,
    ) -> Result<IsmOutput> {
        with_workers(self.workers, || self.accumulate(data, cross_data))
    }

    fn accumulate(
        &self,
        data: ArrayView2<'_, f64>,
        cross_data: Option<ArrayView2<'_, f64>>,
    ) -> Result<IsmOutput> {
        self.validate()?;
        let (n_times, n_units) = data.dim();
        if n_times == 0 || n_units == 0 {
            return Err(Error::EmptyInput);
        }
        check_cluster_count(self.n_clusters, n_units)?;
        if let Some(cross) = cross_data {
            if cross.nrows() != n_times {
                return Err(Error::shape(
                    format!("{n_times} time points in both domains"),
                    format!("{} time points in the cross domain", cross.nrows()),
                ));
            }
            if cross.ncols() == 0 {
                return Err(Error::EmptyInput);
            }
        }

        let shape = match (cross_data, self.cross_output) {
            (Some(cross), CrossOutput::Rectangular) => (n_units, cross.ncols()),
            _ => (n_units, n_units),
        };
        tracing::debug!(
            units = n_units,
            times = n_times,
            bootstraps = self.n_bootstraps,
            clusters = self.n_clusters,
            cross = cross_data.is_some(),
            "individual stability matrix"
        );

        let similarity = self.cluster.similarity();
        let replicate = |i: usize| -> Result<Array2<f64>> {
            let mut rng = StdRng::seed_from_u64(split_seed(self.seed, i as u64));
            let cluster = self.replicate_cluster(i);
            match cross_data {
                None => self.single_replicate(&cluster, similarity.as_ref(), data, &mut rng),
                Some(cross) => {
                    self.cross_replicate(&cluster, similarity.as_ref(), data, cross, &mut rng)
                }
            }
        };

        let (mut matrix, completed) = match self.time_budget {
            None => (
                sum_replicates(0..self.n_bootstraps, shape, replicate)?,
                self.n_bootstraps,
            ),
            Some(budget) => self.accumulate_within(budget, shape, replicate)?,
        };
        matrix /= completed as f64;
        Ok(IsmOutput {
            matrix,
            n_bootstraps: completed,
        })
    }

    /// Accumulate in batches until all replicates ran or `budget` elapsed.
    /// The first batch always runs.
    fn accumulate_within<F>(
        &self,
        budget: Duration,
        shape: (usize, usize),
        replicate: F,
    ) -> Result<(Array2<f64>, usize)>
    where
        F: Fn(usize) -> Result<Array2<f64>> + Send + Sync,
    {
        let start = Instant::now();
        let step = batch_size();
        let mut acc = Array2::zeros(shape);
        let mut done = 0;
        while done < self.n_bootstraps {
            if done > 0 && start.elapsed() >= budget {
                tracing::debug!(
                    completed = done,
                    requested = self.n_bootstraps,
                    "time budget exhausted; no further replicates scheduled"
                );
                break;
            }
            let end = (done + step).min(self.n_bootstraps);
            acc += &sum_replicates(done..end, shape, &replicate)?;
            done = end;
        }
        Ok((acc, done))
    }

    /// Clustering configuration of iteration `i`; engine randomness is
    /// split off the iteration seed so replicates draw independently.
    pub(crate) fn replicate_cluster(&self, i: usize) -> ClusterConfig {
        self.cluster.reseeded(split_seed(split_seed(self.seed, i as u64), 1))
    }

    fn single_replicate(
        &self,
        cluster: &ClusterConfig,
        similarity: &dyn Similarity,
        data: ArrayView2<'_, f64>,
        rng: &mut StdRng,
    ) -> Result<Array2<f64>> {
        let sample = self.resampling.resample(data, rng)?;
        let partition = cluster_with(similarity, sample.t(), self.n_clusters, cluster)?;
        let mut adjacency = adjacency_matrix(&partition.labels)?;
        if cluster.masks_adjacency() {
            mask_below(
                &mut adjacency,
                partition.affinity.view(),
                cluster.affinity_threshold,
            );
        }
        Ok(adjacency)
    }

    fn cross_replicate(
        &self,
        cluster: &ClusterConfig,
        similarity: &dyn Similarity,
        data: ArrayView2<'_, f64>,
        cross: ArrayView2<'_, f64>,
        rng: &mut StdRng,
    ) -> Result<Array2<f64>> {
        let rows_a = self.resampling.indices(data.nrows(), rng)?;
        let rows_b = match self.cross_resampling {
            CrossResampling::Paired => rows_a.clone(),
            CrossResampling::Independent => self.resampling.indices(cross.nrows(), rng)?,
        };
        let a = data.select(Axis(0), &rows_a);
        let b = cross.select(Axis(0), &rows_b);

        let partition =
            cross_cluster_with(similarity, a.t(), b.t(), self.n_clusters, cluster)?;
        let threshold = cluster.affinity_threshold;
        match self.cross_output {
            CrossOutput::Rectangular => {
                let mut adjacency = cross_adjacency(&partition.labels, &partition.reference_labels)?;
                if cluster.masks_adjacency() {
                    mask_below(&mut adjacency, partition.profile.view(), threshold);
                }
                Ok(adjacency)
            }
            CrossOutput::Source => {
                let mut adjacency = adjacency_matrix(&partition.labels)?;
                if cluster.masks_adjacency() {
                    let within = similarity.within(a.t())?;
                    mask_below(&mut adjacency, within.view(), threshold);
                }
                Ok(adjacency)
            }
        }
    }
}

/// Compute one ISM with default resampling and clustering.
///
/// `data` and `cross_data` are time × units. An `affinity_threshold` of 0
/// passes all similarities through.
///
/// ```rust
/// use basc::individual_stability_matrix;
/// use ndarray::Array2;
///
/// // 40 time points, units 0-2 follow one signal, units 3-5 another.
/// let data = Array2::from_shape_fn((40, 6), |(t, u)| {
///     let phase = if u < 3 { 0.0 } else { 1.7 };
///     (t as f64 * 0.7 + phase).sin() + 0.01 * u as f64 * (t as f64 * 0.3).cos()
/// });
/// let ism = individual_stability_matrix(data.view(), 20, 2, None, 0.0, 7).unwrap();
/// assert_eq!(ism.dim(), (6, 6));
/// assert_eq!(ism[[4, 4]], 1.0);
/// ```
pub fn individual_stability_matrix(
    data: ArrayView2<'_, f64>,
    n_bootstraps: usize,
    n_clusters: usize,
    cross_data: Option<ArrayView2<'_, f64>>,
    affinity_threshold: f64,
    seed: u64,
) -> Result<Array2<f64>> {
    let config = IsmConfig::new(n_bootstraps, n_clusters)
        .with_seed(seed)
        .with_cluster(ClusterConfig::default().with_affinity_threshold(affinity_threshold));
    Ok(config.run(data, cross_data)?.matrix)
}

/// One ISM per subject, in parallel over subjects.
///
/// `thresholds` optionally overrides the affinity threshold per subject.
/// Subject `s` runs with seed `split_seed(config.seed, s)`.
pub fn individual_stability_batch(
    subjects: &[ArrayView2<'_, f64>],
    thresholds: Option<&[f64]>,
    config: &IsmConfig,
) -> Result<Vec<IsmOutput>> {
    if subjects.is_empty() {
        return Err(Error::EmptyInput);
    }
    if let Some(t) = thresholds {
        if t.len() != subjects.len() {
            return Err(Error::shape(
                format!("{} thresholds", subjects.len()),
                format!("{} thresholds", t.len()),
            ));
        }
    }

    let subject_config = |s: usize| -> IsmConfig {
        let mut cfg = config.clone();
        cfg.seed = split_seed(config.seed, s as u64);
        if let Some(t) = thresholds {
            cfg.cluster.affinity_threshold = t[s];
        }
        cfg
    };

    with_workers(config.workers, || {
        #[cfg(feature = "parallel")]
        let outputs: Result<Vec<IsmOutput>> = subjects
            .par_iter()
            .enumerate()
            .map(|(s, data)| subject_config(s).accumulate(*data, None))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let outputs: Result<Vec<IsmOutput>> = subjects
            .iter()
            .enumerate()
            .map(|(s, data)| subject_config(s).accumulate(*data, None))
            .collect();

        outputs
    })
}
