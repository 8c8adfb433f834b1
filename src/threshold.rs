//
// threshold.rs
// Dicom-AutoWL
//
// Turns an estimated window/level into an inclusive clip interval bounded by the storage range.
//
// Dicom-AutoWL contributors - October 2026

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::estimator::{EstimationError, WindowLevel};
use crate::pixel_range::PixelStorageType;

/// Inclusive clip bounds; always `min_allowed <= low <= high <= max_allowed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipInterval {
    pub low: i32,
    pub high: i32,
}

impl ClipInterval {
    /// Clip every sample into `[low, high]`.
    pub fn apply(&self, samples: &mut Array2<i32>) {
        let (low, high) = (self.low, self.high);
        samples.mapv_inplace(|v| v.max(low).min(high));
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Threshold {
    /// The estimator asked for no adjustment; the slice passes through untouched.
    Identity,
    Clip(ClipInterval),
}

/// Compute the clip interval for `wl`.
///
/// The upper bound is pre-incremented by one because the window describes a half-open
/// interval while the clip is inclusive. Both bounds are truncated toward zero and then
/// clamped into the storage range.
pub fn threshold_for(
    wl: WindowLevel,
    storage: PixelStorageType,
) -> Result<Threshold, EstimationError> {
    if !wl.window.is_finite() || !wl.level.is_finite() {
        return Err(EstimationError::NonFinite {
            window: wl.window,
            level: wl.level,
        });
    }
    if wl.is_identity() {
        return Ok(Threshold::Identity);
    }

    let half_width = (wl.window - 1.0) / 2.0;
    let lo = wl.level - 0.5 - half_width;
    let hi = wl.level - 0.5 + half_width + 1.0;

    let (min_allowed, max_allowed) = storage.range();
    let low = truncate_into(lo, min_allowed, max_allowed);
    let high = truncate_into(hi, min_allowed, max_allowed);

    // A negative window crosses the bounds; clipping with crossed bounds yields `high` everywhere.
    let low = low.min(high);

    Ok(Threshold::Clip(ClipInterval { low, high }))
}

fn truncate_into(value: f64, min_allowed: i32, max_allowed: i32) -> i32 {
    // `as` saturates for out-of-range floats, so the clamp below sees sane integers.
    let truncated = value.trunc() as i64;
    truncated.clamp(i64::from(min_allowed), i64::from(max_allowed)) as i32
}
