//
// error.rs
// Dicom-AutoWL
//
// Error taxonomy for volume processing and the mapping of any failure onto an I/O, processing or unexpected kind.
//
// Dicom-AutoWL contributors - October 2026

use std::io;

use thiserror::Error;

use crate::dicom_io::VolumeIoError;
use crate::estimator::EstimationError;
use crate::pixel_range::{DeclaredType, PixelStorageType};

/// Failures that abort processing of a whole volume.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("slice {slice}: unsupported storage type {declared}, only signed or unsigned 16-bit integers can be processed")]
    UnsupportedStorageType { slice: usize, declared: DeclaredType },

    #[error("slice {slice}: window/level estimation failed")]
    EstimationFailure {
        slice: usize,
        #[source]
        source: EstimationError,
    },

    #[error("slice {slice}: sample {value} does not fit the {storage} range")]
    SampleOutOfRange {
        slice: usize,
        value: i32,
        storage: PixelStorageType,
    },

    #[error("slice {slice} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        slice: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("slice {slice} is {found} but the volume is {expected}")]
    MixedStorageTypes {
        slice: usize,
        expected: PixelStorageType,
        found: PixelStorageType,
    },

    #[error("volume has no slices")]
    EmptyVolume,
}

/// Coarse failure category used to pick a process exit code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Processing,
    Unexpected,
}

impl ErrorKind {
    /// Classify an application error by walking its source chain.
    pub fn of(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<PipelineError>().is_some() {
                return ErrorKind::Processing;
            }
            if let Some(io_err) = cause.downcast_ref::<VolumeIoError>() {
                if io_err.is_processing() {
                    return ErrorKind::Processing;
                }
                return ErrorKind::Io;
            }
            if cause.downcast_ref::<io::Error>().is_some()
                || cause.downcast_ref::<walkdir::Error>().is_some()
            {
                return ErrorKind::Io;
            }
        }
        ErrorKind::Unexpected
    }

    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Unexpected => 1,
            ErrorKind::Io => 2,
            ErrorKind::Processing => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn pipeline_errors_are_processing_failures() {
        let err = anyhow::Error::new(PipelineError::EmptyVolume).context("while processing a.dcm");
        assert_eq!(ErrorKind::of(&err), ErrorKind::Processing);
        assert_eq!(ErrorKind::of(&err).exit_code(), 3);
    }

    #[test]
    fn io_errors_are_classified_through_context() {
        let result: Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let err = result.context("reading input").unwrap_err();
        assert_eq!(ErrorKind::of(&err), ErrorKind::Io);
    }

    #[test]
    fn anything_else_is_unexpected() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(ErrorKind::of(&err), ErrorKind::Unexpected);
        assert_eq!(ErrorKind::of(&err).exit_code(), 1);
    }

    #[test]
    fn messages_name_the_offending_slice() {
        let err = PipelineError::UnsupportedStorageType {
            slice: 2,
            declared: DeclaredType::Float32,
        };
        assert!(err.to_string().starts_with("slice 2: unsupported storage type float32"));
    }
}
