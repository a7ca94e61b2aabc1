pub mod dicomdir;
pub mod walk;

use crate::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use self::walk::walk_folder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    IndexFile(PathBuf),
    FolderWalk(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub source: DiscoverySource,
    pub paths: Vec<PathBuf>,
}

/// Finds candidate files under `input`: the files referenced by a DICOMDIR
/// when one exists and yields anything, otherwise a recursive walk of
/// `input/dicom_folder`.
pub fn discover(input: &Path, dicom_folder: &str, ignore_globs: &[String]) -> Result<Discovery, Error> {
    for name in dicomdir::INDEX_FILE_NAMES {
        let candidate = input.join(name);
        if !candidate.is_file() {
            continue;
        }
        match dicomdir::referenced_files(&candidate) {
            Ok(paths) if !paths.is_empty() => {
                info!("Using {} ({} referenced files)", candidate.display(), paths.len());
                return Ok(Discovery {
                    source: DiscoverySource::IndexFile(candidate),
                    paths,
                });
            }
            Ok(_) => warn!("{} references no existing files", candidate.display()),
            Err(e) => warn!("Ignoring {}: {}", candidate.display(), e),
        }
        break;
    }

    let folder = input.join(dicom_folder);
    info!("Walking {}", folder.display());
    let paths = walk_folder(&folder, ignore_globs);
    Ok(Discovery {
        source: DiscoverySource::FolderWalk(folder),
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_falls_back_to_folder_walk() {
        let tmp = tempdir().unwrap();
        let folder = tmp.path().join("dicom");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("IM1"), b"x").unwrap();

        let discovery = discover(tmp.path(), "dicom", &[]).unwrap();
        assert_eq!(discovery.source, DiscoverySource::FolderWalk(folder.clone()));
        assert_eq!(discovery.paths, vec![folder.join("IM1")]);
    }

    #[test]
    fn test_discover_ignores_unparseable_dicomdir() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("DICOMDIR"), b"garbage").unwrap();
        let folder = tmp.path().join("dicom");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("IM1"), b"x").unwrap();

        let discovery = discover(tmp.path(), "dicom", &[]).unwrap();
        assert!(matches!(discovery.source, DiscoverySource::FolderWalk(_)));
        assert_eq!(discovery.paths.len(), 1);
    }
}
