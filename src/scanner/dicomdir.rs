use crate::error::Error;
use dicom_dictionary_std::tags;
use dicom_object::OpenFileOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names probed for a media directory-listing file.
pub const INDEX_FILE_NAMES: [&str; 2] = ["DICOMDIR", "dicomdir"];

/// Reads the directory record sequence of a DICOMDIR and returns every
/// referenced file that exists, resolved against the DICOMDIR's directory.
pub fn referenced_files(dicomdir: &Path) -> Result<Vec<PathBuf>, Error> {
    let base_dir = dicomdir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let obj = OpenFileOptions::new()
        .open_file(dicomdir)
        .map_err(|e| Error::Other(format!("Cannot parse {}: {}", dicomdir.display(), e)))?;

    let records = match obj.element(tags::DIRECTORY_RECORD_SEQUENCE) {
        Ok(elem) => elem.items().unwrap_or(&[]),
        Err(_) => return Ok(Vec::new()),
    };

    let mut files = Vec::new();
    for record in records {
        let Ok(elem) = record.element(tags::REFERENCED_FILE_ID) else {
            continue;
        };
        let Ok(components) = elem.to_multi_str() else {
            continue;
        };
        let path = resolve_file_id(&base_dir, &components);
        if path.is_file() {
            files.push(path);
        } else {
            debug!("Referenced file {} does not exist", path.display());
        }
    }
    Ok(files)
}

/// Joins the components of a Referenced File ID onto `base_dir`.
/// A single component may itself carry backslash separators.
pub fn resolve_file_id<S: AsRef<str>>(base_dir: &Path, components: &[S]) -> PathBuf {
    let mut path = base_dir.to_path_buf();
    for component in components {
        for part in component.as_ref().split('\\') {
            let part = part.trim();
            if !part.is_empty() {
                path.push(part);
            }
        }
    }
    path
}
