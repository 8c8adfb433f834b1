//
// pipeline.rs
// Dicom-AutoWL
//
// Per-slice orchestration: validate, estimate, clip, snip the background tail, rebin and offset to zero.
//
// Dicom-AutoWL contributors - October 2026

use ndarray::{Array2, ArrayView2};
use tracing::{debug, enabled, info, trace, warn, Level};

use crate::error::PipelineError;
use crate::estimator::{EstimateRequest, WindowLevelEstimator};
use crate::mixture::MixtureFitter;
use crate::models::{SliceOutcome, SliceReport};
use crate::pixel_range::{Calibration, DeclaredType, PixelStorageType};
use crate::rebin::{half_range_bins, rebin};
use crate::stats::slice_statistics;
use crate::tail::{low_cutoff, snip_tail, DEFAULT_TAIL_SIGMA};
use crate::threshold::{threshold_for, Threshold};

/// One slice as handed over by a volume source.
#[derive(Debug, Clone)]
pub struct SliceInput<'a> {
    pub index: usize,
    pub declared: DeclaredType,
    pub calibration: Option<Calibration>,
    pub samples: ArrayView2<'a, i32>,
}

/// A finished slice, ready to be stored at its index.
#[derive(Debug, Clone)]
pub struct ProcessedSlice {
    pub samples: Array2<i32>,
    pub report: SliceReport,
}

/// Runs the auto window/level steps on single slices.
///
/// Holds no per-slice state, so one processor can be shared across threads.
pub struct SliceProcessor<'a> {
    estimator: &'a dyn WindowLevelEstimator,
    fitter: &'a dyn MixtureFitter,
    tail_sigma: f64,
}

impl<'a> SliceProcessor<'a> {
    pub fn new(estimator: &'a dyn WindowLevelEstimator, fitter: &'a dyn MixtureFitter) -> Self {
        Self {
            estimator,
            fitter,
            tail_sigma: DEFAULT_TAIL_SIGMA,
        }
    }

    pub fn with_tail_sigma(mut self, tail_sigma: f64) -> Self {
        self.tail_sigma = tail_sigma;
        self
    }

    /// Resolve the storage type of a slice without touching its samples.
    pub fn storage_type(
        index: usize,
        declared: DeclaredType,
        calibration: Option<Calibration>,
    ) -> Result<PixelStorageType, PipelineError> {
        PixelStorageType::classify(declared, calibration)
            .map_err(|declared| PipelineError::UnsupportedStorageType { slice: index, declared })
    }

    pub fn process(&self, input: SliceInput<'_>) -> Result<ProcessedSlice, PipelineError> {
        let index = input.index;
        let storage = Self::storage_type(index, input.declared, input.calibration)?;
        if let Some(&value) = input.samples.iter().find(|&&v| !storage.contains(v)) {
            return Err(PipelineError::SampleOutOfRange {
                slice: index,
                value,
                storage,
            });
        }
        trace!(slice = index, %storage, "range validated");

        let request = EstimateRequest::raw(input.samples, storage.is_signed());
        let window_level = self
            .estimator
            .estimate(&request)
            .and_then(|wl| threshold_for(wl, storage).map(|t| (wl, t)));
        let (window_level, threshold) = window_level
            .map_err(|source| PipelineError::EstimationFailure { slice: index, source })?;
        debug!(
            slice = index,
            window = window_level.window,
            level = window_level.level,
            "auto window/level"
        );

        let mut report = SliceReport::new(index, storage, window_level);
        report.before = slice_statistics(input.samples);

        let interval = match threshold {
            Threshold::Identity => {
                info!(slice = index, "no adjustment requested, slice stored unchanged");
                report.after = report.before;
                return Ok(ProcessedSlice {
                    samples: input.samples.to_owned(),
                    report,
                });
            }
            Threshold::Clip(interval) => interval,
        };

        let mut samples = input.samples.to_owned();
        interval.apply(&mut samples);
        report.outcome = SliceOutcome::Adjusted;
        report.clip = Some(interval);
        debug!(slice = index, low = interval.low, high = interval.high, "clipped");
        log_stage(index, "clip", samples.view());

        let cutoff = match low_cutoff(&samples, self.fitter, self.tail_sigma) {
            Ok(cutoff) => cutoff,
            Err(err) => {
                warn!(slice = index, %err, "leaving background tail in place");
                report.tail_fallback = true;
                samples.iter().copied().min().unwrap_or_default()
            }
        };
        snip_tail(&mut samples, cutoff);
        report.tail_cutoff = Some(cutoff);
        debug!(slice = index, cutoff, "snipped background tail");
        log_stage(index, "snip", samples.view());

        let min = samples.iter().copied().min().unwrap_or_default();
        let max = samples.iter().copied().max().unwrap_or_default();
        let nbins = half_range_bins(min, max);
        let outcome = rebin(&samples, nbins);
        report.nbins = Some(nbins);
        report.flat = outcome.is_flat();
        if report.flat {
            info!(slice = index, value = min, "flat slice after tail snip, stored as zeros");
        }
        let rebinned = outcome.into_inner();
        trace!(slice = index, nbins, "rebinned");
        log_stage(index, "rebin", rebinned.view());

        // Offset by the post-rebin minimum so the stored slice starts at exactly zero.
        let offset = rebinned.iter().copied().fold(f64::INFINITY, f64::min);
        let offset = if offset.is_finite() { offset.trunc() } else { 0.0 };

        let mut saturated = 0;
        let stored = rebinned.mapv(|v| {
            let value = (v - offset).trunc() as i64;
            let clamped = storage.saturate(value);
            if i64::from(clamped) != value {
                saturated += 1;
            }
            clamped
        });
        if saturated > 0 {
            warn!(slice = index, saturated, %storage, "samples saturated when stored");
        }
        report.saturated = saturated;
        report.after = slice_statistics(stored.view());
        if let Some(after) = report.after {
            debug!(
                slice = index,
                stage = "offset",
                min = after.min,
                max = after.max,
                median = after.median,
                mean = after.mean,
                "stage statistics"
            );
        }

        Ok(ProcessedSlice {
            samples: stored,
            report,
        })
    }
}

/// Statistics of an intermediate slice, computed only when debug output is wanted.
fn log_stage<T>(index: usize, stage: &str, samples: ArrayView2<'_, T>)
where
    T: Copy + Into<f64>,
{
    if !enabled!(Level::DEBUG) {
        return;
    }
    if let Some(s) = slice_statistics(samples) {
        debug!(
            slice = index,
            stage,
            min = s.min,
            max = s.max,
            median = s.median,
            mean = s.mean,
            "stage statistics"
        );
    }
}
