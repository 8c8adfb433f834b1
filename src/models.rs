//
// models.rs
// Dicom-AutoWL
//
// Serializable records describing what the pipeline did to each slice and to each volume.
//
// Dicom-AutoWL contributors - October 2026

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::estimator::WindowLevel;
use crate::pixel_range::PixelStorageType;
use crate::threshold::ClipInterval;

/// Summary statistics of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceStatistics {
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceOutcome {
    /// The estimator requested no adjustment and the slice was stored unchanged.
    Identity,
    Adjusted,
}

/// Per-slice processing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceReport {
    pub index: usize,
    pub storage: PixelStorageType,
    pub window_level: WindowLevel,
    pub outcome: SliceOutcome,
    pub clip: Option<ClipInterval>,
    pub tail_cutoff: Option<i32>,
    /// The mixture fit was impossible and the tail was left in place.
    pub tail_fallback: bool,
    pub nbins: Option<f64>,
    pub flat: bool,
    /// Samples that had to be saturated when stored back as 16-bit.
    pub saturated: usize,
    pub before: Option<SliceStatistics>,
    pub after: Option<SliceStatistics>,
}

impl SliceReport {
    pub fn new(index: usize, storage: PixelStorageType, window_level: WindowLevel) -> Self {
        Self {
            index,
            storage,
            window_level,
            outcome: SliceOutcome::Identity,
            clip: None,
            tail_cutoff: None,
            tail_fallback: false,
            nbins: None,
            flat: false,
            saturated: 0,
            before: None,
            after: None,
        }
    }
}

/// Processing record for one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub storage: PixelStorageType,
    pub rows: usize,
    pub columns: usize,
    pub slices: Vec<SliceReport>,
}

impl VolumeReport {
    pub fn adjusted_slices(&self) -> usize {
        self.slices
            .iter()
            .filter(|s| s.outcome == SliceOutcome::Adjusted)
            .count()
    }
}
