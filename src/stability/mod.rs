//! Bootstrap stability matrices.
//!
//! ## Individual stability (ISM)
//!
//! For one subject, repeat N times:
//!
//! ```text
//! resample time (T × U) → cluster units → adjacency (U × U) → accumulate
//! ```
//!
//! and divide by N. Entry `(i, j)` is the fraction of replicates in which
//! units i and j shared a cluster. The diagonal is exactly 1 and the matrix
//! is symmetric. In cross mode rows index domain A and columns domain B.
//!
//! ## Group stability (GSM)
//!
//! The elementwise mean of subject ISMs, optionally averaged over
//! bootstrap replicates of the subject set. The GSM is then clustered
//! (each row is the unit's stability profile) and summarized per cluster.
//!
//! ## Parallelism
//!
//! Bootstrap iterations are independent; with the `parallel` feature they
//! run on rayon and are folded by elementwise addition. Iteration `i`
//! always seeds its RNG with `split_seed(seed, i)`, so outputs do not
//! depend on thread count or scheduling.

use std::ops::Range;

use ndarray::Array2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Error, Result};

mod group;
mod individual;
mod score;

pub use group::{
    group_bootstrap_matrix, group_stability_matrix, join_group_stability, GroupStability,
    GsmConfig, SubjectSampler,
};
pub use individual::{
    individual_stability_batch, individual_stability_matrix, CrossOutput, CrossResampling,
    IsmConfig, IsmOutput,
};
pub use score::{cluster_matrix_average, ism_gsm_correlation, ClusterScores, DiagonalConvention};

/// Run `job` on a dedicated pool of `workers` threads, or on the ambient pool.
#[cfg(feature = "parallel")]
pub(crate) fn with_workers<T, F>(workers: Option<usize>, job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    match workers {
        Some(0) => Err(Error::InvalidParameter {
            name: "workers",
            message: "must be at least 1",
        }),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| Error::Other(format!("thread pool: {e}")))?;
            pool.install(job)
        }
        None => job(),
    }
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn with_workers<T, F>(workers: Option<usize>, job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    if workers == Some(0) {
        return Err(Error::InvalidParameter {
            name: "workers",
            message: "must be at least 1",
        });
    }
    job()
}

/// Replicates summed sequentially inside one partial sum.
const REPLICATE_CHUNK: usize = 8;

/// Elementwise sum of `replicate(i)` over `range`; the first error aborts.
///
/// The range is cut into fixed chunks whose partial sums are added in
/// index order, so floating-point results do not depend on the thread count.
pub(crate) fn sum_replicates<F>(
    range: Range<usize>,
    shape: (usize, usize),
    replicate: F,
) -> Result<Array2<f64>>
where
    F: Fn(usize) -> Result<Array2<f64>> + Send + Sync,
{
    let end = range.end;
    let chunk_sum = |start: usize| -> Result<Array2<f64>> {
        let mut acc = Array2::zeros(shape);
        for i in start..(start + REPLICATE_CHUNK).min(end) {
            acc += &replicate(i)?;
        }
        Ok(acc)
    };
    let starts: Vec<usize> = range.step_by(REPLICATE_CHUNK).collect();

    #[cfg(feature = "parallel")]
    let partials = starts
        .into_par_iter()
        .map(chunk_sum)
        .collect::<Result<Vec<_>>>()?;

    #[cfg(not(feature = "parallel"))]
    let partials = starts
        .into_iter()
        .map(chunk_sum)
        .collect::<Result<Vec<_>>>()?;

    let mut total = Array2::zeros(shape);
    for partial in &partials {
        total += partial;
    }
    Ok(total)
}

/// Iterations scheduled per batch when a time budget is checked between batches.
pub(crate) fn batch_size() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads().max(1)
    }

    #[cfg(not(feature = "parallel"))]
    {
        1
    }
}
