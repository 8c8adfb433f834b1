use anyhow::Result;
use ndarray::ArrayView2;
use std::path::Path;

use crate::dicom_io::{self, DicomVolume};
use crate::models::SliceStatistics;
use crate::volume::VolumeSource;

/// Calculate min, max, median and mean of a slice. Returns `None` for an empty slice.
pub fn slice_statistics<T>(slice: ArrayView2<'_, T>) -> Option<SliceStatistics>
where
    T: Copy + Into<f64>,
{
    if slice.is_empty() {
        return None;
    }

    let mut values: Vec<f64> = slice.iter().map(|&v| v.into()).collect();
    values.sort_by(f64::total_cmp);

    let count = values.len();
    let min = values[0];
    let max = values[count - 1];
    let mean = values.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (values[count / 2 - 1] + values[count / 2]) / 2.0
    } else {
        values[count / 2]
    };

    Some(SliceStatistics {
        min,
        max,
        median,
        mean,
    })
}

/// Per-slice statistics of every frame in a DICOM volume.
pub fn statistics_for_file(input: &Path) -> Result<Vec<SliceStatistics>> {
    let volume = dicom_io::read_volume(input)?;
    Ok(volume_statistics(&volume))
}

fn volume_statistics(volume: &DicomVolume) -> Vec<SliceStatistics> {
    (0..volume.slice_count())
        .filter_map(|i| slice_statistics(volume.samples(i)))
        .collect()
}

/// Print per-slice statistics, as a table or as JSON.
pub fn stats(input: &Path, json: bool) -> Result<()> {
    let statistics = statistics_for_file(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statistics)?);
        return Ok(());
    }

    println!("Statistics for {:?}", input);
    for (index, s) in statistics.iter().enumerate() {
        println!(
            "  Slice {:03}: min {:.0} | max {:.0} | median {:.1} | mean {:.2}",
            index, s.min, s.max, s.median, s.mean
        );
    }

    Ok(())
}
