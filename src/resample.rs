//! Bootstrap resampling of time-series matrices.
//!
//! A replicate keeps the shape `(T, U)` of its input: every row of the
//! output is a row of the input, chosen by one of two strategies.
//!
//! | Strategy | Draws | Preserves |
//! |----------|-------|-----------|
//! | Simple   | T independent rows | marginal distribution only |
//! | Block    | ⌈T / ℓ⌉ circular blocks of ℓ rows | short-range autocorrelation |
//!
//! # Circular Block Bootstrap
//!
//! ```text
//! starts  s₁ … s_b  ~ Uniform[0, T)        b = ⌈T / ℓ⌉
//! rows    (sᵢ + 0) mod T, …, (sᵢ + ℓ - 1) mod T
//! output  concat(blocks)[..T]
//! ```
//!
//! The default block length is `⌊√T⌋` (at least 1).
//!
//! All draws come from a caller-supplied RNG; nothing here touches global
//! random state, so a seeded `StdRng` reproduces every replicate exactly.

use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How time points are redrawn for one bootstrap replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// Rows drawn independently and uniformly with replacement.
    Simple,
    /// Circular block bootstrap; `None` uses `⌊√T⌋`.
    Block {
        /// Rows per block.
        block_length: Option<usize>,
    },
}

impl Default for Resampling {
    fn default() -> Self {
        Resampling::Block { block_length: None }
    }
}

impl Resampling {
    /// Draw the row indices of one replicate of a matrix with `n_rows` rows.
    pub fn indices<R: Rng + ?Sized>(&self, n_rows: usize, rng: &mut R) -> Result<Vec<usize>> {
        match *self {
            Resampling::Simple => standard_bootstrap_indices(n_rows, rng),
            Resampling::Block { block_length } => {
                block_bootstrap_indices(n_rows, block_length, rng)
            }
        }
    }

    /// Draw one replicate of `data` (time × units).
    pub fn resample<R: Rng + ?Sized>(
        &self,
        data: ArrayView2<'_, f64>,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let idx = self.indices(data.nrows(), rng)?;
        Ok(data.select(Axis(0), &idx))
    }
}

/// Default block length for a series of `n_rows` time points: `⌊√T⌋`, at least 1.
pub fn default_block_length(n_rows: usize) -> usize {
    ((n_rows as f64).sqrt().floor() as usize).max(1)
}

/// Row indices for a simple bootstrap: `n_rows` uniform draws from `[0, n_rows)`.
pub fn standard_bootstrap_indices<R: Rng + ?Sized>(
    n_rows: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    if n_rows == 0 {
        return Err(Error::EmptyInput);
    }
    Ok((0..n_rows).map(|_| rng.random_range(0..n_rows)).collect())
}

/// Row indices for a circular block bootstrap.
///
/// Draws `⌈T / ℓ⌉` block starts, expands each into `ℓ` consecutive rows
/// modulo `T`, and truncates the concatenation to exactly `T` rows.
pub fn block_bootstrap_indices<R: Rng + ?Sized>(
    n_rows: usize,
    block_length: Option<usize>,
    rng: &mut R,
) -> Result<Vec<usize>> {
    if n_rows == 0 {
        return Err(Error::EmptyInput);
    }
    let block_length = block_length.unwrap_or_else(|| default_block_length(n_rows));
    if block_length == 0 {
        return Err(Error::InvalidParameter {
            name: "block_length",
            message: "must be at least 1",
        });
    }
    if block_length > n_rows {
        return Err(Error::InvalidParameter {
            name: "block_length",
            message: "must not exceed the number of time points",
        });
    }

    let n_blocks = n_rows.div_ceil(block_length);
    let mut idx = Vec::with_capacity(n_blocks * block_length);
    for _ in 0..n_blocks {
        let start = rng.random_range(0..n_rows);
        idx.extend((0..block_length).map(|offset| (start + offset) % n_rows));
    }
    idx.truncate(n_rows);
    Ok(idx)
}

/// Circular block bootstrap of `data` (time × units).
///
/// `block_length = None` uses [`default_block_length`].
pub fn bootstrap_resample<R: Rng + ?Sized>(
    data: ArrayView2<'_, f64>,
    block_length: Option<usize>,
    rng: &mut R,
) -> Result<Array2<f64>> {
    Resampling::Block { block_length }.resample(data, rng)
}

/// Simple (row-independent) bootstrap of `data` (time × units).
pub fn standard_bootstrap<R: Rng + ?Sized>(
    data: ArrayView2<'_, f64>,
    rng: &mut R,
) -> Result<Array2<f64>> {
    Resampling::Simple.resample(data, rng)
}

/// Derive the seed of stream `stream` from `base` (SplitMix64 finalizer).
///
/// Parallel workers seed their own `StdRng` from this so that iteration `i`
/// draws the same numbers regardless of which thread runs it.
pub fn split_seed(base: u64, stream: u64) -> u64 {
    let mut z = base
        .wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
