use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::reader::{MetadataReader, ReadFailure, ReadMode};
use crate::record::InstanceRecord;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Outcome of indexing a set of paths.
#[derive(Debug, Default)]
pub struct IndexOutcome {
    /// Successfully read records, sorted by path.
    pub records: Vec<InstanceRecord>,
    /// Paths that could not be read and why, sorted by path.
    pub failures: Vec<(PathBuf, ReadFailure)>,
}

impl IndexOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Failure counts keyed by reason.
    pub fn failure_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, failure) in &self.failures {
            *counts.entry(failure.reason().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Reads metadata for every path on a dedicated pool of `workers` threads.
///
/// Each path appears at most once in the result: repeated input paths
/// collapse to one record. A failing read never aborts the run, it is kept
/// in `IndexOutcome::failures`. Completion order is discarded, both
/// collections come back sorted by path.
pub fn build_index<R>(
    paths: &[PathBuf],
    workers: usize,
    mode: ReadMode,
    reader: &R,
    reporter: &dyn ProgressReporter,
) -> Result<IndexOutcome, Error>
where
    R: MetadataReader + ?Sized,
{
    let total = paths.len();
    info!("Indexing {} files with {} read workers...", total, workers.max(1));
    let start = Instant::now();
    reporter.on_index_start(total);

    let records: DashMap<PathBuf, InstanceRecord> = DashMap::new();
    let failures: DashMap<PathBuf, ReadFailure> = DashMap::new();
    let done = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;

    pool.install(|| {
        paths.par_iter().for_each(|path| {
            match reader.read(path, mode) {
                Ok(attributes) => {
                    let size_bytes = fs::metadata(path).ok().map(|m| m.len());
                    records.insert(
                        path.clone(),
                        InstanceRecord::new(path.clone(), size_bytes, attributes),
                    );
                }
                Err(failure) => {
                    trace!("Skipping {}: {}", path.display(), failure);
                    failures.insert(path.clone(), failure);
                }
            }
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_index_progress(n, total);
        })
    });

    let mut records: Vec<InstanceRecord> = records.into_iter().map(|(_, r)| r).collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));
    let mut failures: Vec<(PathBuf, ReadFailure)> = failures.into_iter().collect();
    failures.sort_by(|a, b| a.0.cmp(&b.0));

    let duration = start.elapsed();
    debug!(
        "Index completed in {:.2}s: {} records, {} failures",
        duration.as_secs_f64(),
        records.len(),
        failures.len(),
    );
    reporter.on_index_complete(records.len(), failures.len(), duration.as_secs_f64());

    Ok(IndexOutcome { records, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::record::AttributeMap;
    use std::path::Path;

    struct EvenReader;

    impl MetadataReader for EvenReader {
        fn read(&self, path: &Path, _mode: ReadMode) -> Result<AttributeMap, ReadFailure> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let n: u32 = name.parse().unwrap();
            if n % 2 == 0 {
                let mut map = AttributeMap::new();
                map.insert("InstanceNumber".to_string(), Some(name));
                Ok(map)
            } else {
                Err(ReadFailure::Malformed("odd".to_string()))
            }
        }
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let paths: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("/x/{}", i))).collect();
        let outcome = build_index(&paths, 4, ReadMode::Fixed, &EvenReader, &SilentReporter).unwrap();

        assert_eq!(outcome.records.len(), 10);
        assert_eq!(outcome.failures.len(), 10);
        assert_eq!(outcome.failure_counts().get("malformed"), Some(&10));
        // Files do not exist on disk, so size is unknown.
        assert!(outcome.records.iter().all(|r| r.size_bytes.is_none()));
    }

    #[test]
    fn test_repeated_paths_collapse() {
        let paths = vec![PathBuf::from("/x/2"), PathBuf::from("/x/2"), PathBuf::from("/x/4")];
        let outcome = build_index(&paths, 2, ReadMode::Fixed, &EvenReader, &SilentReporter).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].path, PathBuf::from("/x/2"));
    }

    #[test]
    fn test_zero_workers_still_runs() {
        let paths = vec![PathBuf::from("/x/8")];
        let outcome = build_index(&paths, 0, ReadMode::Fixed, &EvenReader, &SilentReporter).unwrap();
        assert_eq!(outcome.records.len(), 1);
    }
}
