//
// dicom_access.rs
// Dicom-AutoWL
//
// Typed lookups of optional attributes on an in-memory dataset.
//
// Dicom-AutoWL contributors - October 2026

use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;

/// Missing or unconvertible attributes read as `None`.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_int(&self, tag: Tag) -> Option<i64>;
    fn element_f64(&self, tag: Tag) -> Option<f64>;

    fn has_element(&self, tag: Tag) -> bool;
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        let value = self.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_end_matches(['\0', ' ']);
        (!value.is_empty()).then(|| value.to_string())
    }

    fn element_int(&self, tag: Tag) -> Option<i64> {
        self.element(tag).ok()?.to_int::<i64>().ok()
    }

    fn element_f64(&self, tag: Tag) -> Option<f64> {
        self.element(tag).ok()?.to_float64().ok()
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }
}
