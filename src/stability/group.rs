//! Group stability matrices (GSM).
//!
//! ```text
//! ISMs ──(optional subject bootstrap, B replicates)──▶ mean ──▶ GSM
//! GSM rows as unit profiles ──cluster──▶ labels ──▶ per-cluster scores
//! ```

use ndarray::Array2;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::score::{cluster_matrix_average, ClusterScores, DiagonalConvention};
use super::{sum_replicates, with_workers};
use crate::cluster::{check_cluster_count, cluster_with, ClusterConfig};
use crate::error::{Error, Result};
use crate::resample::split_seed;

/// Configuration of a GSM run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsmConfig {
    /// Subject-bootstrap replicates; ignored when the bootstrap is off.
    pub n_bootstraps: usize,
    /// Group clusters.
    pub n_clusters: usize,
    /// Resample the subject set with replacement.
    pub subject_bootstrap: bool,
    /// Stratum id per subject; resampling then stays within strata.
    pub strata: Option<Vec<usize>>,
    /// Diagonal handling of per-cluster scores.
    pub diagonal: DiagonalConvention,
    /// Base seed; replicate `b` uses `split_seed(seed, b)`.
    pub seed: u64,
    /// Dedicated worker threads; `None` uses the ambient pool.
    pub workers: Option<usize>,
    /// Clustering of the GSM.
    pub cluster: ClusterConfig,
}

impl Default for GsmConfig {
    fn default() -> Self {
        Self {
            n_bootstraps: 0,
            n_clusters: 10,
            subject_bootstrap: false,
            strata: None,
            diagonal: DiagonalConvention::Exclude,
            seed: 0,
            workers: None,
            cluster: ClusterConfig::default(),
        }
    }
}

impl GsmConfig {
    /// Plain-mean config with `n_clusters` group clusters.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    /// Enable the subject bootstrap with `n_bootstraps` replicates.
    pub fn with_subject_bootstrap(mut self, n_bootstraps: usize) -> Self {
        self.subject_bootstrap = true;
        self.n_bootstraps = n_bootstraps;
        self
    }

    /// Resample within strata (one id per subject).
    pub fn with_strata(mut self, strata: Vec<usize>) -> Self {
        self.strata = Some(strata);
        self
    }

    /// Set the diagonal convention of cluster scores.
    pub fn with_diagonal(mut self, diagonal: DiagonalConvention) -> Self {
        self.diagonal = diagonal;
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

    /// Set the clustering of the GSM.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }
}

/// Group matrix, its partition and per-cluster scores.
#[derive(Debug, Clone)]
pub struct GroupStability {
    /// Group stability matrix.
    pub gsm: Array2<f64>,
    /// Group cluster per unit.
    pub labels: Vec<usize>,
    /// Per-cluster scores and their unit-resolution forms.
    pub scores: ClusterScores,
}

/// How one replicate of the subject set is drawn.
#[derive(Debug, Clone)]
pub enum SubjectSampler {
    /// `S` uniform draws with replacement.
    Uniform,
    /// `S` draws with replacement, proportional to weight.
    Weighted(WeightedIndex<f64>),
    /// Uniform draws within each stratum, stratum sizes preserved.
    Stratified(Vec<Vec<usize>>),
}

impl SubjectSampler {
    /// Weighted sampler; weights must be non-negative with a positive sum.
    pub fn weighted(weights: &[f64]) -> Result<Self> {
        WeightedIndex::new(weights.iter().copied())
            .map(SubjectSampler::Weighted)
            .map_err(|_| Error::InvalidParameter {
                name: "subject_bootstrap_weights",
                message: "must be finite, non-negative and not all zero",
            })
    }

    /// Stratified sampler from one stratum id per subject.
    pub fn stratified(strata: &[usize]) -> Result<Self> {
        if strata.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n_strata = strata.iter().copied().max().map_or(0, |m| m + 1);
        let mut members = vec![Vec::new(); n_strata];
        for (subject, &stratum) in strata.iter().enumerate() {
            members[stratum].push(subject);
        }
        members.retain(|m| !m.is_empty());
        Ok(SubjectSampler::Stratified(members))
    }

    /// Subject indices of one replicate of `n_subjects` subjects.
    pub fn draw<R: Rng + ?Sized>(&self, n_subjects: usize, rng: &mut R) -> Vec<usize> {
        match self {
            SubjectSampler::Uniform => (0..n_subjects)
                .map(|_| rng.random_range(0..n_subjects))
                .collect(),
            SubjectSampler::Weighted(dist) => (0..n_subjects).map(|_| dist.sample(rng)).collect(),
            SubjectSampler::Stratified(strata) => strata
                .iter()
                .flat_map(|members| {
                    (0..members.len())
                        .map(|_| members[rng.random_range(0..members.len())])
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }
}

/// One subject-bootstrap replicate: the mean of a resampled set of ISMs.
pub fn group_bootstrap_matrix<R: Rng + ?Sized>(
    isms: &[Array2<f64>],
    sampler: &SubjectSampler,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let n = check_isms(isms)?;
    let drawn = sampler.draw(isms.len(), rng);
    if drawn.is_empty() {
        return Err(Error::EmptyInput);
    }
    let mut acc = Array2::<f64>::zeros((n, n));
    for &s in &drawn {
        let ism = isms.get(s).ok_or_else(|| {
            Error::shape(format!("subject < {}", isms.len()), format!("subject {s}"))
        })?;
        acc += ism;
    }
    acc /= drawn.len() as f64;
    Ok(acc)
}

/// Average subject-bootstrap replicates, cluster the result and score it.
pub fn join_group_stability(
    replicates: &[Array2<f64>],
    config: &GsmConfig,
) -> Result<GroupStability> {
    let n = check_isms(replicates)?;
    config.cluster.validate()?;
    check_cluster_count(config.n_clusters, n)?;
    let mut gsm = Array2::<f64>::zeros((n, n));
    for replicate in replicates {
        gsm += replicate;
    }
    gsm /= replicates.len() as f64;
    summarize(gsm, config)
}

/// Build the GSM from subject ISMs, cluster it and score the clusters.
///
/// Without a subject bootstrap the GSM is the plain mean of `isms`.
/// Supplying `subject_bootstrap_weights` turns the bootstrap on with
/// weighted draws; weights and strata are mutually exclusive.
pub fn group_stability_matrix(
    isms: &[Array2<f64>],
    config: &GsmConfig,
    subject_bootstrap_weights: Option<&[f64]>,
) -> Result<GroupStability> {
    let n = check_isms(isms)?;
    config.cluster.validate()?;
    check_cluster_count(config.n_clusters, n)?;
    let n_subjects = isms.len();

    let sampler = match (subject_bootstrap_weights, config.strata.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidParameter {
                name: "subject_bootstrap_weights",
                message: "cannot be combined with strata",
            })
        }
        (Some(weights), None) => {
            check_subject_count("subject_bootstrap_weights", weights.len(), n_subjects)?;
            Some(SubjectSampler::weighted(weights)?)
        }
        (None, Some(strata)) if config.subject_bootstrap => {
            check_subject_count("strata", strata.len(), n_subjects)?;
            Some(SubjectSampler::stratified(strata)?)
        }
        (None, _) if config.subject_bootstrap => Some(SubjectSampler::Uniform),
        (None, _) => None,
    };

    tracing::debug!(
        subjects = n_subjects,
        units = n,
        bootstraps = if sampler.is_some() { config.n_bootstraps } else { 0 },
        clusters = config.n_clusters,
        "group stability matrix"
    );

    let gsm = match sampler {
        None => {
            let mut mean = Array2::<f64>::zeros((n, n));
            for ism in isms {
                mean += ism;
            }
            mean / n_subjects as f64
        }
        Some(sampler) => {
            if config.n_bootstraps == 0 {
                return Err(Error::InvalidParameter {
                    name: "n_bootstraps",
                    message: "must be at least 1 when the subject bootstrap is on",
                });
            }
            let total = with_workers(config.workers, || {
                sum_replicates(0..config.n_bootstraps, (n, n), |b| {
                    let mut rng = StdRng::seed_from_u64(split_seed(config.seed, b as u64));
                    group_bootstrap_matrix(isms, &sampler, &mut rng)
                })
            })?;
            total / config.n_bootstraps as f64
        }
    };

    summarize(gsm, config)
}

fn summarize(gsm: Array2<f64>, config: &GsmConfig) -> Result<GroupStability> {
    let similarity = config.cluster.similarity();
    let partition = cluster_with(similarity.as_ref(), gsm.view(), config.n_clusters, &config.cluster)?;
    let scores = cluster_matrix_average(gsm.view(), &partition.labels, config.diagonal)?;

    for (cluster, &score) in scores.cluster_scores.iter().enumerate() {
        let size = partition.labels.iter().filter(|&&l| l == cluster).count();
        tracing::debug!(cluster, size, score, "group cluster");
    }

    Ok(GroupStability {
        gsm,
        labels: partition.labels,
        scores,
    })
}

/// Common square shape of a non-empty ISM collection.
fn check_isms(isms: &[Array2<f64>]) -> Result<usize> {
    let first = isms.first().ok_or(Error::EmptyInput)?;
    let n = first.nrows();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    for ism in isms {
        if ism.dim() != (n, n) {
            return Err(Error::shape(
                format!("{n}x{n} stability matrices"),
                format!("{}x{}", ism.nrows(), ism.ncols()),
            ));
        }
    }
    Ok(n)
}

fn check_subject_count(name: &'static str, len: usize, n_subjects: usize) -> Result<()> {
    if len != n_subjects {
        return Err(Error::shape(
            format!("{n_subjects} {name}"),
            format!("{len} {name}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Block-structured ISM over 6 units ({0,1,2}, {3,4,5}) with `leak`
    /// co-assignment across blocks.
    fn block_ism(leak: f64) -> Array2<f64> {
        Array2::from_shape_fn((6, 6), |(i, j)| {
            if i == j {
                1.0
            } else if i / 3 == j / 3 {
                1.0 - leak
            } else {
                leak
            }
        })
    }

    #[test]
    fn test_gsm_plain_mean() {
        let isms = vec![block_ism(0.0), block_ism(0.2)];
        let group = group_stability_matrix(&isms, &GsmConfig::new(2), None).unwrap();
        assert!((group.gsm[[0, 1]] - 0.9).abs() < 1e-12);
        assert!((group.gsm[[0, 3]] - 0.1).abs() < 1e-12);
        assert_eq!(group.labels[0], group.labels[2]);
        assert_eq!(group.labels[3], group.labels[5]);
        assert_ne!(group.labels[0], group.labels[3]);
        for &score in &group.scores.cluster_scores {
            assert!((score - 0.9).abs() < 1e-12);
        }
        assert_eq!(group.scores.unit_scores.len(), 6);
    }

    #[test]
    fn test_gsm_bootstrap_identical_across_workers() {
        let isms: Vec<Array2<f64>> = (0..7).map(|s| block_ism(0.03 * s as f64)).collect();
        let config = GsmConfig::new(2).with_subject_bootstrap(500).with_seed(5);
        let reference = group_stability_matrix(&isms, &config.clone().with_workers(1), None)
            .unwrap()
            .gsm;
        for workers in [2, 3, 4, 7, 8] {
            let gsm = group_stability_matrix(&isms, &config.clone().with_workers(workers), None)
                .unwrap()
                .gsm;
            assert_eq!(gsm, reference, "{workers} workers");
        }
    }

    #[test]
    fn test_gsm_subject_bootstrap_bounds() {
        let isms = vec![block_ism(0.0), block_ism(0.1), block_ism(0.3)];
        let config = GsmConfig::new(2).with_subject_bootstrap(20).with_seed(5);
        let group = group_stability_matrix(&isms, &config, None).unwrap();
        for i in 0..6 {
            assert!((group.gsm[[i, i]] - 1.0).abs() < 1e-12);
            for j in 0..6 {
                assert!((0.0..=1.0 + 1e-12).contains(&group.gsm[[i, j]]));
                assert!((group.gsm[[i, j]] - group.gsm[[j, i]]).abs() < 1e-12);
            }
        }
        // Deterministic for a fixed seed.
        let again = group_stability_matrix(&isms, &config, None).unwrap();
        assert_eq!(group.gsm, again.gsm);
    }

    #[test]
    fn test_gsm_weighted_bootstrap_follows_weights() {
        let isms = vec![block_ism(0.0), block_ism(0.4)];
        let config = GsmConfig::new(2).with_subject_bootstrap(10);
        let group = group_stability_matrix(&isms, &config, Some(&[1.0, 0.0][..])).unwrap();
        // Only subject 0 is ever drawn.
        assert_eq!(group.gsm, isms[0]);
    }

    #[test]
    fn test_gsm_stratified() {
        let isms = vec![block_ism(0.0), block_ism(0.2), block_ism(0.2), block_ism(0.0)];
        let config = GsmConfig::new(2)
            .with_subject_bootstrap(5)
            .with_strata(vec![0, 1, 1, 0]);
        let group = group_stability_matrix(&isms, &config, None).unwrap();
        // Every replicate has two stratum-0 and two stratum-1 draws.
        assert!((group.gsm[[0, 1]] - 0.9).abs() < 1e-12);

        let bad = GsmConfig::new(2).with_subject_bootstrap(5).with_strata(vec![0, 1]);
        assert!(group_stability_matrix(&isms, &bad, None).is_err());
        assert!(group_stability_matrix(&isms, &config, Some(&[1.0; 4][..])).is_err());
    }

    #[test]
    fn test_gsm_errors() {
        let config = GsmConfig::new(2);
        assert!(matches!(
            group_stability_matrix(&[], &config, None),
            Err(Error::EmptyInput)
        ));
        let mixed = vec![block_ism(0.0), Array2::<f64>::eye(4)];
        assert!(matches!(
            group_stability_matrix(&mixed, &config, None),
            Err(Error::InvalidShape { .. })
        ));
        let isms = vec![block_ism(0.0)];
        assert!(group_stability_matrix(&isms, &GsmConfig::new(7), None).is_err());
        let no_replicates = GsmConfig::new(2).with_subject_bootstrap(0);
        assert!(matches!(
            group_stability_matrix(&isms, &no_replicates, None),
            Err(Error::InvalidParameter { name: "n_bootstraps", .. })
        ));
        assert!(group_stability_matrix(&isms, &GsmConfig::new(2), Some(&[1.0, 1.0][..])).is_err());
        assert!(group_stability_matrix(&isms, &GsmConfig::new(2), Some(&[-1.0][..])).is_err());
    }

    #[test]
    fn test_map_join_matches_direct() {
        let isms = vec![block_ism(0.0), block_ism(0.1), block_ism(0.3)];
        let config = GsmConfig::new(2).with_subject_bootstrap(8).with_seed(11);
        let replicates: Vec<_> = (0..8)
            .map(|b| {
                let mut rng = StdRng::seed_from_u64(split_seed(11, b));
                group_bootstrap_matrix(&isms, &SubjectSampler::Uniform, &mut rng).unwrap()
            })
            .collect();
        let joined = join_group_stability(&replicates, &config).unwrap();
        let direct = group_stability_matrix(&isms, &config, None).unwrap();
        for (a, b) in joined.gsm.iter().zip(direct.gsm.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(joined.labels, direct.labels);
    }
}
