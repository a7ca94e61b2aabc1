use super::{MetadataReader, ReadFailure, ReadMode};
use crate::record::AttributeMap;
use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::VR;
use dicom_dictionary_std::{tags, StandardDataDictionary};
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use std::path::Path;

/// Keys extracted in fixed mode: identification plus CT exposure and
/// reconstruction parameters.
pub const DEFAULT_KEYS: [&str; 26] = [
    "PatientID",
    "PatientName",
    "PatientBirthDate",
    "StudyInstanceUID",
    "StudyDate",
    "AcquisitionTime",
    "StudyID",
    "AccessionNumber",
    "SeriesInstanceUID",
    "SeriesNumber",
    "SeriesDescription",
    "ProtocolName",
    "Modality",
    "Manufacturer",
    "ImageType",
    "ImagePositionPatient",
    "SOPInstanceUID",
    "InstanceNumber",
    "ConvolutionKernel",
    "KVP",
    "ExposureTime",
    "ExposureTimeInms",
    "XRayTubeCurrent",
    "Exposure",
    "SpiralPitchFactor",
    "PitchFactor",
];

/// Metadata reader backed by dicom-object. Stops parsing before pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomReader;

impl DicomReader {
    pub fn open(path: &Path) -> Result<DefaultDicomObject, ReadFailure> {
        OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .map_err(|e| classify(path, e))
    }
}

impl MetadataReader for DicomReader {
    fn read(&self, path: &Path, mode: ReadMode) -> Result<AttributeMap, ReadFailure> {
        let obj = Self::open(path)?;
        Ok(match mode {
            ReadMode::Fixed => extract_fixed(&obj),
            ReadMode::AllTags => extract_all(&obj),
        })
    }
}

fn classify(path: &Path, err: impl std::fmt::Display) -> ReadFailure {
    if let Err(io) = std::fs::File::open(path) {
        return ReadFailure::Unreadable(io.to_string());
    }
    ReadFailure::Malformed(err.to_string())
}

fn extract_fixed(obj: &DefaultDicomObject) -> AttributeMap {
    DEFAULT_KEYS
        .iter()
        .map(|key| {
            // Non-standard keywords such as PitchFactor simply come back empty.
            let value = obj
                .element_by_name(key)
                .ok()
                .and_then(|elem| elem.to_str().ok())
                .map(|s| s.trim().to_string());
            (key.to_string(), value)
        })
        .collect()
}

fn extract_all(obj: &DefaultDicomObject) -> AttributeMap {
    let mut row = AttributeMap::new();
    for elem in obj.iter() {
        let tag = elem.header().tag;
        let name = StandardDataDictionary
            .by_tag(tag)
            .map(|entry| entry.alias().to_string())
            .unwrap_or_else(|| format!("({:04X},{:04X})", tag.group(), tag.element()));

        if elem.vr() == VR::SQ {
            let items = elem.items().map(|items| items.len()).unwrap_or(0);
            row.insert(name, Some(format!("SQ[{}]", items)));
            continue;
        }

        if let Ok(value) = elem.to_str() {
            row.insert(name, Some(value.trim().to_string()));
        }
    }
    row
}
