//
// config.rs
// Dicom-AutoWL
//
// Options controlling the auto window/level pipeline and where its outputs go.
//
// Dicom-AutoWL contributors - October 2026

use std::path::PathBuf;

use crate::mixture::MixtureOptions;
use crate::tail::DEFAULT_TAIL_SIGMA;

/// Files picked up when the input is a directory.
pub const DEFAULT_INPUT_SUFFIX: &str = "_result.dcm";
/// Appended to the input stem to name the output file.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "awl";

/// How the slices of one volume are scheduled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone)]
pub struct AutoWindowOptions {
    /// Multiples of the median component's std dev below its mean at which the tail is cut.
    pub tail_sigma: f64,
    pub mixture: MixtureOptions,
    pub execution: Execution,
    pub input_suffix: String,
    pub output_suffix: String,
    /// Write outputs here instead of next to each input.
    pub output_dir: Option<PathBuf>,
    /// Also write a JSON report beside each output.
    pub report: bool,
}

impl Default for AutoWindowOptions {
    fn default() -> Self {
        Self {
            tail_sigma: DEFAULT_TAIL_SIGMA,
            mixture: MixtureOptions::default(),
            execution: Execution::default(),
            input_suffix: DEFAULT_INPUT_SUFFIX.to_string(),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            output_dir: None,
            report: false,
        }
    }
}
