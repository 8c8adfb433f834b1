//
// tail.rs
// Dicom-AutoWL
//
// Statistical background-tail cutoff: the median-mean mixture component minus a multiple of its spread.
//
// Dicom-AutoWL contributors - October 2026

use ndarray::Array2;
use thiserror::Error;
use tracing::debug;

use crate::mixture::{median_component, MixtureError, MixtureFitter};

pub const DEFAULT_TAIL_SIGMA: f64 = 3.0;

#[derive(Debug, Error, PartialEq)]
pub enum TailError {
    #[error("cannot model the intensity distribution: {0}")]
    DegenerateHistogram(#[from] MixtureError),
}

/// Low cutoff below which samples are considered background tail.
///
/// Zero-valued samples are hard background and do not take part in the fit. The cutoff
/// never drops below the slice's current minimum, so the range is never widened.
pub fn low_cutoff<F>(samples: &Array2<i32>, fitter: &F, sigma: f64) -> Result<i32, TailError>
where
    F: MixtureFitter + ?Sized,
{
    let signal: Vec<f64> = samples
        .iter()
        .filter(|&&v| v != 0)
        .map(|&v| f64::from(v))
        .collect();

    let components = fitter.fit(&signal)?;
    let selected = components[median_component(&components)];
    let mut cutoff = selected.mean - sigma * selected.std_dev;
    debug!(
        mean = selected.mean,
        std_dev = selected.std_dev,
        cutoff,
        "median mixture component"
    );

    // `signal` was non-empty, so the slice has a minimum.
    let current_min = samples.iter().copied().min().unwrap_or_default();
    if cutoff < f64::from(current_min) {
        cutoff = f64::from(current_min);
    }
    Ok(cutoff.trunc() as i32)
}

/// Raise every sample below `cutoff` to `cutoff`; the upper end is left alone.
pub fn snip_tail(samples: &mut Array2<i32>, cutoff: i32) {
    samples.mapv_inplace(|v| v.max(cutoff));
}
