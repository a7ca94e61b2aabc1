use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PATIENT_ID: &str = "PatientID";
pub const PATIENT_NAME: &str = "PatientName";
pub const STUDY_UID: &str = "StudyInstanceUID";
pub const STUDY_DATE: &str = "StudyDate";
pub const SERIES_UID: &str = "SeriesInstanceUID";
pub const SERIES_NUMBER: &str = "SeriesNumber";
pub const SERIES_DESCRIPTION: &str = "SeriesDescription";
pub const PROTOCOL_NAME: &str = "ProtocolName";
pub const MODALITY: &str = "Modality";
pub const SOP_INSTANCE_UID: &str = "SOPInstanceUID";
pub const INSTANCE_NUMBER: &str = "InstanceNumber";
pub const IMAGE_POSITION: &str = "ImagePositionPatient";
pub const ACQUISITION_TIME: &str = "AcquisitionTime";

/// Derived columns.
pub const PATH: &str = "_path";
pub const SIZE_BYTES: &str = "_size_bytes";
pub const PROTOCOL_EFFECTIVE: &str = "ProtocolEffective";
pub const PROTOCOL_NORM: &str = "ProtocolNorm";

/// Placeholder for labels that are absent.
pub const NOT_AVAILABLE: &str = "NA";

/// Attribute name to value. `None` means the attribute was requested but
/// the file did not carry it.
pub type AttributeMap = BTreeMap<String, Option<String>>;

/// One successfully read file. Identity is `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    pub attributes: AttributeMap,
    pub protocol_effective: Option<String>,
    pub protocol_norm: Option<String>,
}

impl InstanceRecord {
    pub fn new(path: PathBuf, size_bytes: Option<u64>, attributes: AttributeMap) -> Self {
        Self {
            path,
            size_bytes,
            attributes,
            protocol_effective: None,
            protocol_norm: None,
        }
    }

    /// Looks up an attribute or derived column. Absent and null both yield `None`.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            PROTOCOL_EFFECTIVE => self.protocol_effective.as_deref(),
            PROTOCOL_NORM => self.protocol_norm.as_deref(),
            _ => self.attributes.get(key).and_then(|v| v.as_deref()),
        }
    }

    /// Like `get` but treats blank values as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// True when the key is a column of this record, even if its value is null.
    pub fn has_column(&self, key: &str) -> bool {
        match key {
            PROTOCOL_EFFECTIVE => self.protocol_effective.is_some(),
            PROTOCOL_NORM => self.protocol_norm.is_some(),
            PATH | SIZE_BYTES => true,
            _ => self.attributes.contains_key(key),
        }
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Numeric view of an attribute, `None` when missing or not a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_number)
    }

    /// Cell value for tabular export.
    pub fn cell(&self, column: &str) -> String {
        match column {
            PATH => self.path_str(),
            SIZE_BYTES => self.size_bytes.map(|s| s.to_string()).unwrap_or_default(),
            _ => self.get(column).unwrap_or_default().to_string(),
        }
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Permissive numeric parse: surrounding whitespace is ignored and anything
/// that is not a finite number is treated as absent.
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Depth (third) component of a patient position vector. Accepts
/// `[x, y, z]`, `x\y\z` and `x,y,z` encodings.
pub fn parse_position_depth(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    let parts: Vec<&str> = if inner.contains('\\') {
        inner.split('\\').collect()
    } else {
        inner.split(',').collect()
    };
    let depth = parts.get(2)?;
    parse_number(depth.trim().trim_matches(|c| c == '\'' || c == '"'))
}
