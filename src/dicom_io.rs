//
// dicom_io.rs
// Dicom-AutoWL
//
// Reads 16-bit DICOM volumes into i32 stored-value frames and writes processed volumes back as Explicit VR Little Endian.
//
// Dicom-AutoWL contributors - October 2026

use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::{open_file, DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_pixeldata::PixelDecoder;
use ndarray::{Array3, ArrayView2, Axis};
use thiserror::Error;
use tracing::{debug, info};

use crate::dicom_access::ElementAccess;
use crate::error::PipelineError;
use crate::pipeline::SliceProcessor;
use crate::pixel_range::{Calibration, DeclaredType, PixelStorageType};
use crate::volume::{ProcessedVolume, VolumeSource};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

const SECONDARY_CAPTURE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";
const FALLBACK_SOP_INSTANCE: &str = "1.2.826.0.1.3680043.2.1125.1";
const OUTPUT_COMMENT: &str = "Auto window level volume";

#[derive(Debug, Error)]
pub enum VolumeIoError {
    #[error("failed to open DICOM file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to decode pixel data of {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("unsupported pixel layout in {path:?}: {reason}")]
    Layout { path: PathBuf, reason: String },

    #[error("cannot process {path:?}")]
    Storage {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },

    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl VolumeIoError {
    /// The file was read but its content cannot be processed.
    pub fn is_processing(&self) -> bool {
        matches!(self, VolumeIoError::Storage { .. })
    }
}

/// A decoded single-sample DICOM volume, frames stacked along the first axis.
#[derive(Debug, Clone)]
pub struct DicomVolume {
    object: DefaultDicomObject,
    declared: DeclaredType,
    storage: PixelStorageType,
    calibration: Option<Calibration>,
    frames: Array3<i32>,
}

impl DicomVolume {
    pub fn storage(&self) -> PixelStorageType {
        self.storage
    }

    pub fn frames(&self) -> &Array3<i32> {
        &self.frames
    }
}

impl VolumeSource for DicomVolume {
    fn shape(&self) -> (usize, usize) {
        let (_, rows, columns) = self.frames.dim();
        (rows, columns)
    }

    fn slice_count(&self) -> usize {
        self.frames.len_of(Axis(0))
    }

    fn declared_type(&self, _index: usize) -> DeclaredType {
        self.declared
    }

    fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    fn samples(&self, index: usize) -> ArrayView2<'_, i32> {
        self.frames.index_axis(Axis(0), index)
    }
}

/// Sample type announced by the dataset's pixel module.
pub fn declared_type<O: ElementAccess>(object: &O) -> Result<DeclaredType, String> {
    if object.has_element(tags::FLOAT_PIXEL_DATA) {
        return Ok(DeclaredType::Float32);
    }
    if object.has_element(tags::DOUBLE_FLOAT_PIXEL_DATA) {
        return Ok(DeclaredType::Float64);
    }

    let bits = object
        .element_int(tags::BITS_ALLOCATED)
        .ok_or_else(|| "missing Bits Allocated".to_string())?;
    let signed = object.element_int(tags::PIXEL_REPRESENTATION);
    match (bits, signed) {
        (8, Some(1)) => Ok(DeclaredType::Int8),
        (8, _) => Ok(DeclaredType::UInt8),
        (16, Some(1)) => Ok(DeclaredType::Int16),
        (16, Some(0)) => Ok(DeclaredType::UInt16),
        (16, _) => Ok(DeclaredType::Bits16),
        (32, Some(1)) => Ok(DeclaredType::Int32),
        (32, _) => Ok(DeclaredType::UInt32),
        (other, _) => Err(format!("unsupported Bits Allocated {other}")),
    }
}

/// Smallest/Largest Image Pixel Value, when both are present.
pub fn calibration<O: ElementAccess>(object: &O) -> Option<Calibration> {
    let min = object.element_f64(tags::SMALLEST_IMAGE_PIXEL_VALUE)?;
    let max = object.element_f64(tags::LARGEST_IMAGE_PIXEL_VALUE)?;
    Some(Calibration::new(min, max))
}

/// Bit layout of one stored 16-bit sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    pub bits_stored: u32,
    pub high_bit: u32,
    pub signed: bool,
}

impl SampleLayout {
    pub fn new(bits_stored: u32, high_bit: u32, signed: bool) -> Result<Self, String> {
        if bits_stored == 0 || bits_stored > 16 || high_bit > 15 || high_bit + 1 < bits_stored {
            return Err(format!(
                "Bits Stored {bits_stored} with High Bit {high_bit} does not fit 16-bit samples"
            ));
        }
        Ok(Self {
            bits_stored,
            high_bit,
            signed,
        })
    }

    /// Extract the stored bits of `raw`, sign-extending from the high bit when signed.
    pub fn value(self, raw: u16) -> i32 {
        let shift = self.high_bit + 1 - self.bits_stored;
        let mask = (1_u32 << self.bits_stored) - 1;
        let value = (u32::from(raw) >> shift) & mask;
        if self.signed && value & (1 << (self.bits_stored - 1)) != 0 {
            value as i32 - (1_i32 << self.bits_stored)
        } else {
            value as i32
        }
    }
}

pub fn read_volume(path: &Path) -> Result<DicomVolume, VolumeIoError> {
    let layout = |reason: String| VolumeIoError::Layout {
        path: path.to_path_buf(),
        reason,
    };

    let mut object = open_file(path).map_err(|e| VolumeIoError::Open {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    let declared = declared_type(&*object).map_err(layout)?;
    let calibration = calibration(&*object);
    let storage = SliceProcessor::storage_type(0, declared, calibration).map_err(|source| {
        VolumeIoError::Storage {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!(?path, %declared, %storage, ?calibration, "classified pixel data");

    if declared == DeclaredType::Bits16 {
        // The decoder needs a Pixel Representation; use the one calibration resolved.
        object.put(DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            PrimitiveValue::from(u16::from(storage.is_signed())),
        ));
    }

    let bits_stored = object.element_int(tags::BITS_STORED).unwrap_or(16);
    let high_bit = object.element_int(tags::HIGH_BIT).unwrap_or(bits_stored - 1);
    let sample_layout = SampleLayout::new(
        u32::try_from(bits_stored).unwrap_or(0),
        u32::try_from(high_bit).unwrap_or(u32::MAX),
        storage.is_signed(),
    )
    .map_err(layout)?;

    let decoded = object.decode_pixel_data().map_err(|e| VolumeIoError::Decode {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    if decoded.samples_per_pixel() != 1 {
        return Err(layout(format!(
            "{} samples per pixel, expected 1",
            decoded.samples_per_pixel()
        )));
    }

    let frames = decoded.number_of_frames() as usize;
    let rows = decoded.rows() as usize;
    let columns = decoded.columns() as usize;
    let expected = frames * rows * columns * 2;
    let bytes = decoded.data();
    if bytes.len() < expected {
        return Err(layout(format!(
            "{} bytes of pixel data, expected {}",
            bytes.len(),
            expected
        )));
    }

    // Stored values only: the modality and VOI LUTs are left to the viewer.
    let samples: Vec<i32> = bytes[..expected]
        .chunks_exact(2)
        .map(|pair| sample_layout.value(u16::from_le_bytes([pair[0], pair[1]])))
        .collect();
    let frames = Array3::from_shape_vec((frames, rows, columns), samples)
        .map_err(|e| layout(e.to_string()))?;

    // Release borrow on object so it can move into the volume.
    drop(decoded);

    info!(
        "Read {:?}: {} slice(s) of {}x{}, {}",
        path,
        frames.len_of(Axis(0)),
        rows,
        columns,
        storage
    );

    Ok(DicomVolume {
        object,
        declared,
        storage,
        calibration,
        frames,
    })
}

/// `<dir>/<stem>_<suffix>.dcm`, next to the input unless `output_dir` is given.
pub fn output_path(input: &Path, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "volume".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}_{suffix}.dcm"))
}

/// Store `processed` with the attributes of `source`.
pub fn write_volume(
    source: &DicomVolume,
    processed: &ProcessedVolume,
    output: &Path,
) -> Result<(), VolumeIoError> {
    let write_error = |source: BoxError| VolumeIoError::Write {
        path: output.to_path_buf(),
        source,
    };

    let storage = processed.storage;
    let pixel_bytes: Vec<u8> = processed
        .data
        .iter()
        .flat_map(|&v| match storage {
            PixelStorageType::Signed16 => (v as i16).to_le_bytes(),
            PixelStorageType::Unsigned16 => (v as u16).to_le_bytes(),
        })
        .collect();

    let mut new_obj = source.object.clone().into_inner();
    new_obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::from(pixel_bytes),
    ));
    new_obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)));
    new_obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)));
    new_obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)));
    new_obj.put(DataElement::new(
        tags::PIXEL_REPRESENTATION,
        VR::US,
        PrimitiveValue::from(u16::from(storage.is_signed())),
    ));

    let (min, max) = (processed.min(), processed.max());
    let (vr, smallest, largest) = match storage {
        PixelStorageType::Signed16 => (
            VR::SS,
            PrimitiveValue::from(min as i16),
            PrimitiveValue::from(max as i16),
        ),
        PixelStorageType::Unsigned16 => (
            VR::US,
            PrimitiveValue::from(min as u16),
            PrimitiveValue::from(max as u16),
        ),
    };
    new_obj.put(DataElement::new(tags::SMALLEST_IMAGE_PIXEL_VALUE, vr, smallest));
    new_obj.put(DataElement::new(tags::LARGEST_IMAGE_PIXEL_VALUE, vr, largest));

    // Samples are stored values now, so the modality LUT is the identity.
    new_obj.put(DataElement::new(tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from("1")));
    new_obj.put(DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from("0")));

    let width = f64::from(max) + 1.0 - f64::from(min);
    let center = f64::from(min) + width / 2.0;
    new_obj.put(DataElement::new(
        tags::WINDOW_CENTER,
        VR::DS,
        PrimitiveValue::from(center.to_string()),
    ));
    new_obj.put(DataElement::new(
        tags::WINDOW_WIDTH,
        VR::DS,
        PrimitiveValue::from(width.to_string()),
    ));
    new_obj.put(DataElement::new(
        tags::IMAGE_COMMENTS,
        VR::LT,
        PrimitiveValue::from(OUTPUT_COMMENT),
    ));

    let sop_class_uid = new_obj
        .element_str(tags::SOP_CLASS_UID)
        .unwrap_or_else(|| SECONDARY_CAPTURE_SOP_CLASS.to_string());
    let sop_instance_uid = new_obj
        .element_str(tags::SOP_INSTANCE_UID)
        .unwrap_or_else(|| FALLBACK_SOP_INSTANCE.to_string());

    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(sop_class_uid.as_str())
        .media_storage_sop_instance_uid(sop_instance_uid.as_str())
        .build()
        .map_err(|e| write_error(e.into()))?;

    let mut file_obj =
        FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, file_meta);
    for elem in new_obj {
        file_obj.put(elem);
    }

    file_obj
        .write_to_file(output)
        .map_err(|e| write_error(e.into()))?;
    info!("Wrote {:?} ({}, range [{}, {}])", output, storage, min, max);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::object::InMemDicomObject;

    fn pixel_module(bits: u16, representation: Option<u16>) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
        obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(bits)));
        if let Some(repr) = representation {
            obj.put(DataElement::new(
                tags::PIXEL_REPRESENTATION,
                VR::US,
                PrimitiveValue::from(repr),
            ));
        }
        obj
    }

    #[test]
    fn pixel_module_maps_to_declared_type() {
        assert_eq!(declared_type(&pixel_module(16, Some(1))), Ok(DeclaredType::Int16));
        assert_eq!(declared_type(&pixel_module(16, Some(0))), Ok(DeclaredType::UInt16));
        assert_eq!(declared_type(&pixel_module(16, None)), Ok(DeclaredType::Bits16));
        assert_eq!(declared_type(&pixel_module(8, Some(0))), Ok(DeclaredType::UInt8));
        assert_eq!(declared_type(&pixel_module(32, Some(1))), Ok(DeclaredType::Int32));
        assert!(declared_type(&pixel_module(12, Some(0))).is_err());
        assert!(declared_type(&InMemDicomObject::new_empty_with_dict(StandardDataDictionary)).is_err());
    }

    #[test]
    fn float_pixel_data_wins_over_bits_allocated() {
        let mut obj = pixel_module(32, None);
        obj.put(DataElement::new(
            tags::FLOAT_PIXEL_DATA,
            VR::OF,
            PrimitiveValue::from(vec![0_u8; 16]),
        ));
        assert_eq!(declared_type(&obj), Ok(DeclaredType::Float32));
    }

    #[test]
    fn calibration_needs_both_bounds() {
        let mut obj = pixel_module(16, None);
        obj.put(DataElement::new(
            tags::SMALLEST_IMAGE_PIXEL_VALUE,
            VR::SS,
            PrimitiveValue::from(-100_i16),
        ));
        assert_eq!(calibration(&obj), None);

        obj.put(DataElement::new(
            tags::LARGEST_IMAGE_PIXEL_VALUE,
            VR::SS,
            PrimitiveValue::from(900_i16),
        ));
        assert_eq!(calibration(&obj), Some(Calibration::new(-100.0, 900.0)));
    }

    #[test]
    fn twelve_bit_signed_samples_are_sign_extended() {
        let layout = SampleLayout::new(12, 11, true).expect("layout");
        // -1000 in 12-bit two's complement with the unused high bits cleared.
        assert_eq!(layout.value(0x0C18), -1000);
        // The same value already sign-extended to 16 bits.
        assert_eq!(layout.value((-1000_i16) as u16), -1000);
        assert_eq!(layout.value(0x07FF), 2047);
        assert_eq!(layout.value(0x0800), -2048);
    }

    #[test]
    fn full_width_and_unsigned_layouts() {
        let signed = SampleLayout::new(16, 15, true).expect("layout");
        assert_eq!(signed.value(0x8000), -32768);
        assert_eq!(signed.value(0x7FFF), 32767);

        let unsigned = SampleLayout::new(12, 11, false).expect("layout");
        assert_eq!(unsigned.value(0xFFFF), 4095);
        assert_eq!(SampleLayout::new(16, 15, false).expect("layout").value(0xFFFF), 65535);
    }

    #[test]
    fn high_bit_below_bits_stored_is_rejected() {
        assert!(SampleLayout::new(12, 10, true).is_err());
        assert!(SampleLayout::new(17, 16, false).is_err());
        assert!(SampleLayout::new(0, 15, false).is_err());
    }

    #[test]
    fn output_path_appends_suffix_to_stem() {
        let input = Path::new("/data/case_result.dcm");
        assert_eq!(
            output_path(input, None, "awl"),
            PathBuf::from("/data/case_result_awl.dcm")
        );
        assert_eq!(
            output_path(input, Some(Path::new("/out")), "awl"),
            PathBuf::from("/out/case_result_awl.dcm")
        );
    }

    #[test]
    fn only_storage_failures_count_as_processing() {
        let storage = VolumeIoError::Storage {
            path: PathBuf::from("x.dcm"),
            source: PipelineError::EmptyVolume,
        };
        let layout = VolumeIoError::Layout {
            path: PathBuf::from("x.dcm"),
            reason: "odd".into(),
        };
        assert!(storage.is_processing());
        assert!(!layout.is_processing());
    }
}
