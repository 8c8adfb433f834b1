//
// volume.rs
// Dicom-AutoWL
//
// Slice-by-slice assembly of a processed volume from any decoded volume source, sequentially or with rayon.
//
// Dicom-AutoWL contributors - October 2026

use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::info;

use crate::config::Execution;
use crate::error::PipelineError;
use crate::models::SliceReport;
use crate::pipeline::{ProcessedSlice, SliceInput, SliceProcessor};
use crate::pixel_range::{Calibration, DeclaredType, PixelStorageType};

/// Read access to a decoded volume: slices of one shape stacked along the first axis.
pub trait VolumeSource: Sync {
    /// `(rows, columns)` of every slice.
    fn shape(&self) -> (usize, usize);
    fn slice_count(&self) -> usize;
    fn declared_type(&self, index: usize) -> DeclaredType;
    fn calibration(&self) -> Option<Calibration>;
    fn samples(&self, index: usize) -> ArrayView2<'_, i32>;
}

/// One slice of an [`InMemoryVolume`].
#[derive(Debug, Clone)]
pub struct SourceSlice {
    pub declared: DeclaredType,
    pub samples: Array2<i32>,
}

/// Volume held as individually typed slices.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVolume {
    slices: Vec<SourceSlice>,
    calibration: Option<Calibration>,
}

impl InMemoryVolume {
    pub fn new(slices: Vec<SourceSlice>) -> Self {
        Self {
            slices,
            calibration: None,
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Every slice of `data` (slices × rows × columns) shares `declared`.
    pub fn from_array(declared: DeclaredType, data: &Array3<i32>) -> Self {
        let slices = data
            .axis_iter(Axis(0))
            .map(|s| SourceSlice {
                declared,
                samples: s.to_owned(),
            })
            .collect();
        Self::new(slices)
    }
}

impl VolumeSource for InMemoryVolume {
    fn shape(&self) -> (usize, usize) {
        self.slices
            .first()
            .map(|s| s.samples.dim())
            .unwrap_or((0, 0))
    }

    fn slice_count(&self) -> usize {
        self.slices.len()
    }

    fn declared_type(&self, index: usize) -> DeclaredType {
        self.slices[index].declared
    }

    fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    fn samples(&self, index: usize) -> ArrayView2<'_, i32> {
        self.slices[index].samples.view()
    }
}

/// Output of [`assemble`]: the processed slices stacked in their original order.
#[derive(Debug, Clone)]
pub struct ProcessedVolume {
    pub storage: PixelStorageType,
    /// slices × rows × columns
    pub data: Array3<i32>,
    pub reports: Vec<SliceReport>,
}

impl ProcessedVolume {
    pub fn min(&self) -> i32 {
        self.data.iter().copied().min().unwrap_or_default()
    }

    pub fn max(&self) -> i32 {
        self.data.iter().copied().max().unwrap_or_default()
    }
}

/// Run `processor` over every slice of `source`.
///
/// Any fatal slice error aborts the whole volume and nothing is returned for it.
pub fn assemble<S>(
    source: &S,
    processor: &SliceProcessor<'_>,
    execution: Execution,
) -> Result<ProcessedVolume, PipelineError>
where
    S: VolumeSource + ?Sized,
{
    let count = source.slice_count();
    if count == 0 {
        return Err(PipelineError::EmptyVolume);
    }
    let shape = source.shape();
    let calibration = source.calibration();
    let storage = SliceProcessor::storage_type(0, source.declared_type(0), calibration)?;

    let process_slice = |index: usize| -> Result<ProcessedSlice, PipelineError> {
        let declared = source.declared_type(index);
        let slice_storage = SliceProcessor::storage_type(index, declared, calibration)?;
        if slice_storage != storage {
            return Err(PipelineError::MixedStorageTypes {
                slice: index,
                expected: storage,
                found: slice_storage,
            });
        }
        let samples = source.samples(index);
        if samples.dim() != shape {
            return Err(PipelineError::ShapeMismatch {
                slice: index,
                expected: shape,
                actual: samples.dim(),
            });
        }

        let processed = processor.process(SliceInput {
            index,
            declared,
            calibration,
            samples,
        })?;
        info!("Processed slice: {} of {}", index + 1, count);
        Ok(processed)
    };

    let slices: Vec<ProcessedSlice> = match execution {
        Execution::Sequential => (0..count).map(process_slice).collect::<Result<_, _>>()?,
        Execution::Parallel => (0..count)
            .into_par_iter()
            .map(process_slice)
            .collect::<Result<_, _>>()?,
    };

    let (rows, columns) = shape;
    let mut data = Array3::zeros((count, rows, columns));
    let mut reports = Vec::with_capacity(count);
    for (index, slice) in slices.into_iter().enumerate() {
        data.index_axis_mut(Axis(0), index).assign(&slice.samples);
        reports.push(slice.report);
    }

    Ok(ProcessedVolume {
        storage,
        data,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{FixedEstimator, HistogramEstimator, WindowLevel};
    use crate::mixture::EmMixtureFitter;
    use crate::models::SliceOutcome;

    fn ramp(rows: usize, cols: usize, offset: i32) -> Array2<i32> {
        Array2::from_shape_fn((rows, cols), |(r, c)| offset + (r * cols + c) as i32 * 10)
    }

    /// Each value repeated four times so the histogram estimator sees populated bins.
    fn blocks(rows: usize, cols: usize, offset: i32) -> Array2<i32> {
        Array2::from_shape_fn((rows, cols), |(r, c)| offset + ((r * cols + c) / 4) as i32 * 10)
    }

    fn slice(declared: DeclaredType, samples: Array2<i32>) -> SourceSlice {
        SourceSlice { declared, samples }
    }

    #[test]
    fn identity_volume_is_reassembled_unchanged() {
        let data = Array3::from_shape_fn((3, 4, 4), |(s, r, c)| (s * 100 + r * 4 + c) as i32 - 50);
        let volume = InMemoryVolume::from_array(DeclaredType::Int16, &data);
        let estimator = FixedEstimator(WindowLevel::IDENTITY);
        let fitter = EmMixtureFitter::default();
        let processor = SliceProcessor::new(&estimator, &fitter);

        for execution in [Execution::Sequential, Execution::Parallel] {
            let out = assemble(&volume, &processor, execution).expect("assemble");
            assert_eq!(out.data, data);
            assert_eq!(out.storage, PixelStorageType::Signed16);
            assert!(out.reports.iter().all(|r| r.outcome == SliceOutcome::Identity));
            let indices: Vec<usize> = out.reports.iter().map(|r| r.index).collect();
            assert_eq!(indices, vec![0, 1, 2]);
        }
    }

    #[test]
    fn every_adjusted_slice_starts_at_zero() {
        let volume = InMemoryVolume::new(vec![
            slice(DeclaredType::UInt16, blocks(8, 8, 1000)),
            slice(DeclaredType::UInt16, blocks(8, 8, 3000)),
        ]);
        let estimator = HistogramEstimator::new();
        let fitter = EmMixtureFitter::default();
        let processor = SliceProcessor::new(&estimator, &fitter);

        let out = assemble(&volume, &processor, Execution::Parallel).expect("assemble");
        assert_eq!(out.data.dim(), (2, 8, 8));
        for (index, report) in out.reports.iter().enumerate() {
            assert_eq!(report.outcome, SliceOutcome::Adjusted);
            let stored = out.data.index_axis(Axis(0), index);
            assert_eq!(stored.iter().copied().min(), Some(0));
            assert!(stored.iter().copied().max() > Some(0));
        }
    }

    #[test]
    fn unsupported_slice_aborts_the_volume() {
        let volume = InMemoryVolume::new(vec![
            slice(DeclaredType::UInt16, ramp(4, 4, 0)),
            slice(DeclaredType::Float32, ramp(4, 4, 0)),
            slice(DeclaredType::UInt16, ramp(4, 4, 0)),
        ]);
        let estimator = FixedEstimator(WindowLevel::new(50.0, 60.0));
        let fitter = EmMixtureFitter::default();
        let processor = SliceProcessor::new(&estimator, &fitter);

        let result = assemble(&volume, &processor, Execution::Sequential);
        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedStorageType {
                slice: 1,
                declared: DeclaredType::Float32
            })
        ));
    }

    #[test]
    fn mismatched_slices_are_rejected() {
        let estimator = FixedEstimator(WindowLevel::IDENTITY);
        let fitter = EmMixtureFitter::default();
        let processor = SliceProcessor::new(&estimator, &fitter);

        let shapes = InMemoryVolume::new(vec![
            slice(DeclaredType::UInt16, ramp(4, 4, 0)),
            slice(DeclaredType::UInt16, ramp(4, 5, 0)),
        ]);
        assert!(matches!(
            assemble(&shapes, &processor, Execution::Sequential),
            Err(PipelineError::ShapeMismatch { slice: 1, .. })
        ));

        let types = InMemoryVolume::new(vec![
            slice(DeclaredType::UInt16, ramp(4, 4, 0)),
            slice(DeclaredType::Int16, ramp(4, 4, 0)),
        ]);
        assert!(matches!(
            assemble(&types, &processor, Execution::Sequential),
            Err(PipelineError::MixedStorageTypes { slice: 1, .. })
        ));

        assert!(matches!(
            assemble(&InMemoryVolume::default(), &processor, Execution::Sequential),
            Err(PipelineError::EmptyVolume)
        ));
    }

    #[test]
    fn calibration_resolves_ambiguous_slices() {
        let volume = InMemoryVolume::new(vec![slice(DeclaredType::Bits16, ramp(2, 2, -20))])
            .with_calibration(Calibration::new(-20.0, 10.0));
        let estimator = FixedEstimator(WindowLevel::IDENTITY);
        let fitter = EmMixtureFitter::default();
        let processor = SliceProcessor::new(&estimator, &fitter);

        let out = assemble(&volume, &processor, Execution::Sequential).expect("assemble");
        assert_eq!(out.storage, PixelStorageType::Signed16);
    }
}
