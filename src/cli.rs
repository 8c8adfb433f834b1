//
// cli.rs
// Dicom-AutoWL
//
// Defines the CLI surface with Clap, sets up logging and dispatches commands to the batch, estimate and stats paths.
//
// Dicom-AutoWL contributors - October 2026

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{ArgAction, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::{AutoWindowOptions, Execution, DEFAULT_INPUT_SUFFIX};
use crate::dicom_io;
use crate::estimator::{
    EstimateRequest, FixedEstimator, HistogramEstimator, WindowLevel, WindowLevelEstimator,
};
use crate::tail::DEFAULT_TAIL_SIGMA;
use crate::threshold::{threshold_for, Threshold};
use crate::volume::VolumeSource;
use crate::{batch, stats};

#[derive(Parser)]
#[command(name = "dicom-autowl", version)]
#[command(about = "Automatic window/level normalisation of 16-bit DICOM volumes", long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Adjust one volume, or every matching volume in a directory
    Run {
        #[arg(short, long)]
        input: PathBuf,
        /// Write outputs here instead of next to each input
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// File name suffix selecting inputs when --input is a directory
        #[arg(long, default_value = DEFAULT_INPUT_SUFFIX)]
        suffix: String,
        /// Standard deviations below the median component's mean at which the tail is cut
        #[arg(long, default_value_t = DEFAULT_TAIL_SIGMA, value_parser = parse_tail_sigma)]
        tail_sigma: f64,
        /// Process slices in order on the current thread
        #[arg(long)]
        sequential: bool,
        /// Write a JSON report next to each output
        #[arg(long)]
        report: bool,
        /// Fixed window for every slice instead of the histogram estimate
        #[arg(long)]
        window: Option<f64>,
        #[arg(long)]
        level: Option<f64>,
    },
    /// Print the estimated window/level and clip interval of each slice
    Estimate { file: PathBuf },
    /// Per-slice pixel statistics
    Stats {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

/// Install the fmt subscriber: warnings by default, each `-v` one level more.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            input,
            output_dir,
            suffix,
            tail_sigma,
            sequential,
            report,
            window,
            level,
        } => {
            let options = AutoWindowOptions {
                tail_sigma,
                execution: if sequential {
                    Execution::Sequential
                } else {
                    Execution::Parallel
                },
                input_suffix: suffix,
                output_dir,
                report,
                ..AutoWindowOptions::default()
            };
            let estimator: Box<dyn WindowLevelEstimator> = match parse_window(window, level)? {
                Some(wl) => Box::new(FixedEstimator(wl)),
                None => Box::new(HistogramEstimator::new()),
            };

            let summary = batch::process_path(&input, estimator.as_ref(), &options)?;
            let total = summary.reports.len() + summary.failed.len();
            if let Some((path, err)) = summary.failed.into_iter().next() {
                return Err(err.context(format!(
                    "{} of {} file(s) failed, first: {:?}",
                    total - summary.reports.len(),
                    total,
                    path
                )));
            }
            for report in &summary.reports {
                println!(
                    "{:?} -> {:?} | {} | {} of {} slice(s) adjusted",
                    report.input,
                    report.output,
                    report.storage,
                    report.adjusted_slices(),
                    report.slices.len()
                );
            }
        }
        Commands::Estimate { file } => estimate(&file, &HistogramEstimator::new())?,
        Commands::Stats { file, json } => stats::stats(&file, json)?,
    }

    Ok(())
}

fn estimate(file: &Path, estimator: &dyn WindowLevelEstimator) -> anyhow::Result<()> {
    let volume = dicom_io::read_volume(file)?;
    let storage = volume.storage();

    println!("Window/level for {:?} ({})", file, storage);
    for index in 0..volume.slice_count() {
        let request = EstimateRequest::raw(volume.samples(index), storage.is_signed());
        let wl = estimator
            .estimate(&request)
            .with_context(|| format!("Estimation failed for slice {}", index))?;
        let threshold = threshold_for(wl, storage)
            .with_context(|| format!("Estimation failed for slice {}", index))?;
        match threshold {
            Threshold::Identity => println!(
                "  Slice {:03}: window {} | level {} -> unchanged",
                index, wl.window, wl.level
            ),
            Threshold::Clip(clip) => println!(
                "  Slice {:03}: window {} | level {} -> clip [{}, {}]",
                index, wl.window, wl.level, clip.low, clip.high
            ),
        }
    }

    Ok(())
}

fn parse_tail_sigma(value: &str) -> Result<f64, String> {
    let sigma: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(format!("`{value}` must be a finite, non-negative number"));
    }
    Ok(sigma)
}

fn parse_window(window: Option<f64>, level: Option<f64>) -> anyhow::Result<Option<WindowLevel>> {
    // A fixed window needs both values; reject a lone one early.
    match (window, level) {
        (Some(w), Some(l)) => Ok(Some(WindowLevel::new(w, l))),
        (None, None) => Ok(None),
        _ => Err(anyhow!("Provide both --window and --level, or neither")),
    }
}
