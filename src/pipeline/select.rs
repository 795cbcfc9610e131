//! Selection of the blueprints a run works on.

use std::collections::BTreeSet;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::matrix::{Blueprint, Matrix};

/// Pick the blueprints to run, in matrix order.
///
/// Without a sample size the whole matrix is selected. Otherwise `sample`
/// blueprints are drawn uniformly; `sample` must be strictly smaller than
/// the matrix. With `keep_originals`, the original of every sampled mutant
/// is added back so it can still be compared.
pub fn select<'m>(
    matrix: &'m Matrix,
    sample: Option<usize>,
    seed: Option<u64>,
    keep_originals: bool,
) -> Result<Vec<&'m Blueprint>> {
    let Some(sample) = sample else {
        return Ok(matrix.iter().collect());
    };
    if sample >= matrix.len() {
        return Err(Error::SampleTooLarge {
            sample,
            total: matrix.len(),
        });
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut picked: BTreeSet<usize> = rand::seq::index::sample(&mut rng, matrix.len(), sample)
        .into_iter()
        .collect();

    if keep_originals {
        let all = matrix.as_slice();
        let originals: Vec<usize> = picked
            .iter()
            .filter_map(|&i| matrix.position(&all[i].original_binary))
            .collect();
        picked.extend(originals);
    }
    info!("{} blueprints selected out of {}", picked.len(), matrix.len());

    let all = matrix.as_slice();
    Ok(picked.into_iter().map(|i| &all[i]).collect())
}
