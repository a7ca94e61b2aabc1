pub mod dicom;

use crate::record::AttributeMap;
use std::path::Path;
use thiserror::Error;

pub use self::dicom::{DicomReader, DEFAULT_KEYS};

/// Which attributes a read extracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// The predeclared identification and CT acquisition keys.
    #[default]
    Fixed,
    /// Every attribute present in the file.
    AllTags,
}

/// Why a file could not be indexed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadFailure {
    #[error("unreadable: {0}")]
    Unreadable(String),

    #[error("malformed: {0}")]
    Malformed(String),
}

impl ReadFailure {
    /// Stable label used when counting failures in the run summary.
    pub fn reason(&self) -> &'static str {
        match self {
            ReadFailure::Unreadable(_) => "unreadable",
            ReadFailure::Malformed(_) => "malformed",
        }
    }
}

/// Extracts named attributes from a single file.
///
/// Implementations must fail cleanly on non-conformant input. They are
/// shared across the read worker pool.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path, mode: ReadMode) -> Result<AttributeMap, ReadFailure>;
}

impl<T: MetadataReader + ?Sized> MetadataReader for &T {
    fn read(&self, path: &Path, mode: ReadMode) -> Result<AttributeMap, ReadFailure> {
        (**self).read(path, mode)
    }
}
