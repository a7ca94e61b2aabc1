use crate::protocol::effective_label;
use crate::reader::{MetadataReader, ReadMode};
use crate::record::{AttributeMap, InstanceRecord, PATH, PATIENT_ID, SERIES_UID, STUDY_UID};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_SAMPLE_SIZE: usize = 80;
const TOP_PROTOCOLS: usize = 10;
const EXAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewError {
    pub path: PathBuf,
    pub error: String,
}

/// Quick look at a sample of the discovered files.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub total_files_found: usize,
    pub sampled: usize,
    pub read_errors: usize,
    pub unique_patients_in_sample: usize,
    pub unique_studies_in_sample: usize,
    pub unique_series_in_sample: usize,
    /// Effective protocol labels by descending frequency, ties by label.
    pub top_protocols_in_sample: Vec<(String, usize)>,
    pub examples: Vec<AttributeMap>,
    pub errors_sample: Vec<PreviewError>,
}

/// Evenly spaced picks across `paths`, first file included. Returns every
/// path when there are no more than `sample_size`.
pub fn sample_paths(paths: &[PathBuf], sample_size: usize) -> Vec<&PathBuf> {
    if paths.len() <= sample_size {
        return paths.iter().collect();
    }
    (0..sample_size)
        .map(|i| &paths[i * paths.len() / sample_size])
        .collect()
}

pub fn preview<R>(paths: &[PathBuf], sample_size: usize, reader: &R) -> PreviewReport
where
    R: MetadataReader + ?Sized,
{
    let mut records = Vec::new();
    let mut errors = Vec::new();
    for path in sample_paths(paths, sample_size) {
        match reader.read(path, ReadMode::Fixed) {
            Ok(attributes) => records.push(InstanceRecord::new(path.clone(), None, attributes)),
            Err(e) => errors.push(PreviewError {
                path: path.clone(),
                error: e.to_string(),
            }),
        }
    }

    // Missing study/series identifiers are bucketed per parent, so two
    // unidentified series under different studies still count twice.
    let na = "<NA>";
    let patients: AHashSet<&str> = records
        .iter()
        .map(|r| r.get_non_empty(PATIENT_ID).unwrap_or(na))
        .collect();
    let studies: AHashSet<String> = records
        .iter()
        .map(|r| match r.get_non_empty(STUDY_UID) {
            Some(uid) => uid.to_string(),
            None => format!("{}-{}", na, r.get(PATIENT_ID).unwrap_or_default()),
        })
        .collect();
    let series: AHashSet<String> = records
        .iter()
        .map(|r| match r.get_non_empty(SERIES_UID) {
            Some(uid) => uid.to_string(),
            None => format!("{}-{}", na, r.get(STUDY_UID).unwrap_or_default()),
        })
        .collect();

    let mut protocols: AHashMap<String, usize> = AHashMap::new();
    for record in &records {
        *protocols.entry(effective_label(record)).or_default() += 1;
    }
    let mut top: Vec<(String, usize)> = protocols.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_PROTOCOLS);

    let examples = records
        .iter()
        .take(EXAMPLES)
        .map(|r| {
            let mut row = r.attributes.clone();
            row.insert(PATH.to_string(), Some(r.path_str()));
            row
        })
        .collect();

    PreviewReport {
        total_files_found: paths.len(),
        sampled: records.len(),
        read_errors: errors.len(),
        unique_patients_in_sample: patients.len(),
        unique_studies_in_sample: studies.len(),
        unique_series_in_sample: series.len(),
        top_protocols_in_sample: top,
        examples,
        errors_sample: errors.into_iter().take(EXAMPLES).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReadFailure;
    use std::path::Path;

    struct NameReader;

    impl MetadataReader for NameReader {
        fn read(&self, path: &Path, _mode: ReadMode) -> Result<AttributeMap, ReadFailure> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.starts_with("bad") {
                return Err(ReadFailure::Malformed("not a DICOM file".to_string()));
            }
            let mut map = AttributeMap::new();
            let protocol = if name.starts_with("head") { "Head" } else { "Chest" };
            map.insert("ProtocolName".to_string(), Some(protocol.to_string()));
            map.insert("PatientID".to_string(), Some("P1".to_string()));
            map.insert("SeriesInstanceUID".to_string(), Some(name));
            Ok(map)
        }
    }

    #[test]
    fn test_sample_is_even_and_deterministic() {
        let paths: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("/{}", i))).collect();
        let picked: Vec<String> = sample_paths(&paths, 5)
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(picked, vec!["/0", "/2", "/4", "/6", "/8"]);
        assert_eq!(sample_paths(&paths, 20).len(), 10);
    }

    #[test]
    fn test_preview_counts() {
        let paths: Vec<PathBuf> = ["chest1", "chest2", "head1", "bad1"]
            .iter()
            .map(|n| PathBuf::from(format!("/d/{}", n)))
            .collect();
        let report = preview(&paths, DEFAULT_SAMPLE_SIZE, &NameReader);

        assert_eq!(report.total_files_found, 4);
        assert_eq!(report.sampled, 3);
        assert_eq!(report.read_errors, 1);
        assert_eq!(report.unique_patients_in_sample, 1);
        assert_eq!(report.unique_studies_in_sample, 1);
        assert_eq!(report.unique_series_in_sample, 3);
        assert_eq!(
            report.top_protocols_in_sample,
            vec![("Chest".to_string(), 2), ("Head".to_string(), 1)]
        );
        assert_eq!(report.examples[0].get("_path"), Some(&Some("/d/chest1".to_string())));
        assert_eq!(report.errors_sample[0].path, PathBuf::from("/d/bad1"));
    }
}
