//
// lib.rs
// Dicom-AutoWL
//
// Exposes the pipeline stages, volume I/O and CLI entry point for both binary and library consumers.
//
// Dicom-AutoWL contributors - October 2026

// Pipeline stages, bottom-up.
pub mod pixel_range;
pub mod estimator;
pub mod threshold;
pub mod mixture;
pub mod tail;
pub mod rebin;
pub mod pipeline;
pub mod volume;

// Shared records, errors and options.
pub mod config;
pub mod error;
pub mod models;
pub mod stats;

// File handling and the command line.
pub mod batch;
pub mod cli;
pub mod dicom_access;
pub mod dicom_io;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::{AutoWindowOptions, Execution};
pub use error::{ErrorKind, PipelineError};
pub use estimator::{FixedEstimator, HistogramEstimator, WindowLevel, WindowLevelEstimator};
pub use pipeline::SliceProcessor;
pub use volume::{assemble, InMemoryVolume, ProcessedVolume, VolumeSource};
