//
// pixel_range.rs
// Dicom-AutoWL
//
// Maps the declared sample format of a slice onto the two 16-bit storage types the pipeline accepts and their clamp ranges.
//
// Dicom-AutoWL contributors - October 2026

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample format as declared by the volume container.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    /// 16-bit integers whose signedness the container does not state.
    Bits16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclaredType::Int8 => "int8",
            DeclaredType::UInt8 => "uint8",
            DeclaredType::Int16 => "int16",
            DeclaredType::UInt16 => "uint16",
            DeclaredType::Bits16 => "16-bit integer",
            DeclaredType::Int32 => "int32",
            DeclaredType::UInt32 => "uint32",
            DeclaredType::Float32 => "float32",
            DeclaredType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Display calibration range carried by the source volume.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub min: f64,
    pub max: f64,
}

impl Calibration {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// The two storage types the pipeline can process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelStorageType {
    Signed16,
    Unsigned16,
}

impl PixelStorageType {
    /// Resolve the storage type of a slice, rejecting anything that is not a 16-bit integer.
    ///
    /// Calibration only matters when the declaration leaves the signedness open: a negative
    /// calibrated minimum means the samples are two's complement.
    pub fn classify(
        declared: DeclaredType,
        calibration: Option<Calibration>,
    ) -> Result<Self, DeclaredType> {
        match declared {
            DeclaredType::Int16 => Ok(PixelStorageType::Signed16),
            DeclaredType::UInt16 => Ok(PixelStorageType::Unsigned16),
            DeclaredType::Bits16 => match calibration {
                Some(cal) if cal.min < 0.0 => Ok(PixelStorageType::Signed16),
                _ => Ok(PixelStorageType::Unsigned16),
            },
            other => Err(other),
        }
    }

    /// Inclusive `(min_allowed, max_allowed)` for samples of this type.
    #[inline]
    pub fn range(self) -> (i32, i32) {
        match self {
            PixelStorageType::Signed16 => (i32::from(i16::MIN), i32::from(i16::MAX)),
            PixelStorageType::Unsigned16 => (0, i32::from(u16::MAX)),
        }
    }

    #[inline]
    pub fn is_signed(self) -> bool {
        matches!(self, PixelStorageType::Signed16)
    }

    #[inline]
    pub fn contains(self, value: i32) -> bool {
        let (lo, hi) = self.range();
        (lo..=hi).contains(&value)
    }

    /// Saturating conversion used when results are written back into the storage type.
    #[inline]
    pub fn saturate(self, value: i64) -> i32 {
        let (lo, hi) = self.range();
        value.clamp(i64::from(lo), i64::from(hi)) as i32
    }
}

impl fmt::Display for PixelStorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelStorageType::Signed16 => f.write_str("signed 16-bit"),
            PixelStorageType::Unsigned16 => f.write_str("unsigned 16-bit"),
        }
    }
}
