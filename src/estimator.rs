//
// estimator.rs
// Dicom-AutoWL
//
// Window/level estimation boundary: the trait the pipeline is written against and the bundled histogram-based estimator.
//
// Dicom-AutoWL contributors - October 2026

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Display window as produced by an estimator. A window of exactly 1 requests no adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub window: f64,
    pub level: f64,
}

impl WindowLevel {
    pub const IDENTITY: WindowLevel = WindowLevel {
        window: 1.0,
        level: 0.0,
    };

    pub fn new(window: f64, level: f64) -> Self {
        Self { window, level }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.window == 1.0
    }
}

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("slice has no samples")]
    EmptySlice,

    #[error("sample {0} is outside the 16-bit range")]
    SampleOutOfRange(i32),

    #[error("estimator returned a non-finite window/level ({window}, {level})")]
    NonFinite { window: f64, level: f64 },

    #[error("{0}")]
    Backend(String),
}

/// Everything an estimator is given for one slice.
#[derive(Debug, Clone)]
pub struct EstimateRequest<'a> {
    pub pixels: ArrayView2<'a, i32>,
    pub intercept: f64,
    pub slope: f64,
    /// Value to ignore while building the histogram, if any.
    pub padding: Option<i32>,
    pub signed: bool,
}

impl<'a> EstimateRequest<'a> {
    /// Raw stored values: identity rescale and no padding.
    pub fn raw(pixels: ArrayView2<'a, i32>, signed: bool) -> Self {
        Self {
            pixels,
            intercept: 0.0,
            slope: 1.0,
            padding: None,
            signed,
        }
    }

    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }
}

/// Produces an initial window/level for a slice. Implementations must not keep per-slice state.
pub trait WindowLevelEstimator: Send + Sync {
    fn estimate(&self, request: &EstimateRequest<'_>) -> Result<WindowLevel, EstimationError>;
}

impl<F> WindowLevelEstimator for F
where
    F: Fn(&EstimateRequest<'_>) -> Result<WindowLevel, EstimationError> + Send + Sync,
{
    fn estimate(&self, request: &EstimateRequest<'_>) -> Result<WindowLevel, EstimationError> {
        self(request)
    }
}

/// Returns the same window/level for every slice, for callers that already know the window.
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub WindowLevel);

impl WindowLevelEstimator for FixedEstimator {
    fn estimate(&self, _: &EstimateRequest<'_>) -> Result<WindowLevel, EstimationError> {
        Ok(self.0)
    }
}

/// Bins with at most this many pixels are treated as stray values (overlay text, padding).
const STRAY_COUNT: u32 = 2;
/// A jump larger than this between populated bins splits the histogram.
const MAX_GAP: i32 = 1000;
const HISTOGRAM_SIZE: usize = 0x10000;

/// Histogram-walk estimator: spans the populated, gap-free part of the 16-bit histogram.
#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramEstimator;

impl HistogramEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl WindowLevelEstimator for HistogramEstimator {
    fn estimate(&self, request: &EstimateRequest<'_>) -> Result<WindowLevel, EstimationError> {
        if request.pixels.is_empty() {
            return Err(EstimationError::EmptySlice);
        }

        // Histogram is indexed by the 16-bit pattern, so negative values land in the upper half.
        let padding = request.padding.map(|p| p as u16);
        let mut histogram = vec![0u32; HISTOGRAM_SIZE];
        let mut populated: u32 = 0;
        for &value in request.pixels.iter() {
            if !(i32::from(i16::MIN)..=i32::from(u16::MAX)).contains(&value) {
                return Err(EstimationError::SampleOutOfRange(value));
            }
            let pattern = value as u16;
            if padding == Some(pattern) {
                continue;
            }
            let count = &mut histogram[usize::from(pattern)];
            if *count == STRAY_COUNT {
                populated += 1;
            }
            *count += 1;
        }

        // Signed data is walked from the most negative pattern (0x8000) upwards.
        let offset: u16 = if request.signed { 0x8000 } else { 0 };
        let mut prev_value: i32 = if request.signed { -0xFFFF } else { 0 };
        let mut valid_bins: u32 = 0;
        let mut value_sum: i64 = 0;
        let mut low: i32 = 0;
        let mut high: i32 = 0;

        for index in 0..=u16::MAX {
            let pattern = index.wrapping_add(offset);
            if histogram[usize::from(pattern)] <= STRAY_COUNT {
                continue;
            }
            let value = if request.signed {
                i32::from(pattern as i16)
            } else {
                i32::from(pattern)
            };

            if value - prev_value > MAX_GAP && valid_bins > 0 {
                if valid_bins * 100 / populated < 10 {
                    trace!(value, valid_bins, "histogram gap, restarting run");
                    valid_bins = 0;
                    value_sum = 0;
                } else {
                    trace!(value, valid_bins, "histogram gap, stopping");
                    break;
                }
            }

            if valid_bins == 0 {
                low = value;
            }
            valid_bins += 1;
            value_sum += i64::from(value);
            prev_value = value;
            high = value;
        }

        if valid_bins == 0 {
            return Ok(WindowLevel::IDENTITY);
        }

        let mean_value = (value_sum / i64::from(valid_bins)) as f64;
        let level = (mean_value * request.slope).trunc() + request.intercept;
        let span = f64::from(high - low);
        let mut window = (span * request.slope).trunc();
        if window <= 0.0 {
            window = span;
        }

        Ok(WindowLevel::new(window, level))
    }
}
