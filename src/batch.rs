use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::AutoWindowOptions;
use crate::dicom_io;
use crate::estimator::WindowLevelEstimator;
use crate::mixture::EmMixtureFitter;
use crate::models::VolumeReport;
use crate::pipeline::SliceProcessor;
use crate::volume::{self, VolumeSource};

/// Files handled by one `run`, with the failures that did not stop the batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<VolumeReport>,
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

/// A single file as given, or every file directly inside a directory whose name ends with `suffix`.
pub fn collect_inputs(input: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list directory {:?}", input))?;
        let matches = entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.ends_with(suffix));
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Read, adjust and write one volume.
pub fn process_file(
    input: &Path,
    estimator: &dyn WindowLevelEstimator,
    options: &AutoWindowOptions,
) -> Result<VolumeReport> {
    info!("Processing: {:?}", input);
    let source = dicom_io::read_volume(input)?;

    let fitter = EmMixtureFitter::new(options.mixture);
    let processor = SliceProcessor::new(estimator, &fitter).with_tail_sigma(options.tail_sigma);
    let processed = volume::assemble(&source, &processor, options.execution)
        .with_context(|| format!("Failed to process {:?}", input))?;

    if let Some(dir) = &options.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    }
    let output = dicom_io::output_path(input, options.output_dir.as_deref(), &options.output_suffix);
    dicom_io::write_volume(&source, &processed, &output)?;

    let (rows, columns) = source.shape();
    let report = VolumeReport {
        input: input.to_path_buf(),
        output: output.clone(),
        storage: processed.storage,
        rows,
        columns,
        slices: processed.reports,
    };

    if options.report {
        let report_path = output.with_extension("json");
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&report_path, json)
            .with_context(|| format!("Failed to write report {:?}", report_path))?;
    }

    info!(
        "Auto window level complete: {:?} ({} of {} slice(s) adjusted)",
        output,
        report.adjusted_slices(),
        report.slices.len()
    );
    Ok(report)
}

/// Process every input under `input`, continuing past failed files.
pub fn process_path(
    input: &Path,
    estimator: &dyn WindowLevelEstimator,
    options: &AutoWindowOptions,
) -> Result<BatchSummary> {
    let files = collect_inputs(input, &options.input_suffix)?;
    if files.is_empty() {
        warn!(
            "No files ending with {:?} in {:?}",
            options.input_suffix, input
        );
    }

    let mut summary = BatchSummary::default();
    for file in files {
        match process_file(&file, estimator, options) {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                error!("Error in {:?}: {:#}", file, e);
                summary.failed.push((file, e));
            }
        }
    }

    Ok(summary)
}
