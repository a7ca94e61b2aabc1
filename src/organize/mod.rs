pub mod filter;
pub mod materialize;
pub mod ordering;

use crate::config::{AppConfig, CollisionPolicy, LinkMode};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::record::{
    file_name_of, InstanceRecord, PATIENT_ID, PATIENT_NAME, PROTOCOL_NORM, SERIES_NUMBER,
    SERIES_UID, SOP_INSTANCE_UID, STUDY_UID,
};
use crate::table::Table;
use crate::utils::{sanitize, split_extension};
use ahash::AHashSet;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub use self::filter::RecordFilter;
pub use self::materialize::{materialize, Placement};
pub use self::ordering::{sort_group, OrderingStrategy};

/// Grouping keys for organized tests: one directory per
/// patient, protocol, study and series.
pub const TEST_KEYS: [&str; 6] = [
    PATIENT_NAME,
    PATIENT_ID,
    PROTOCOL_NORM,
    STUDY_UID,
    SERIES_UID,
    SERIES_NUMBER,
];

pub const MANIFEST_FILE: &str = "manifest.csv";

#[derive(Debug, Clone)]
pub struct OrganizeConfig {
    pub link_mode: LinkMode,
    pub on_collision: CollisionPolicy,
    /// 0 = `max(4, digits(group size))`.
    pub pad_width: usize,
    pub copy_workers: usize,
    pub filter: RecordFilter,
    /// Plan names and manifests without touching the filesystem.
    pub dry_run: bool,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            link_mode: LinkMode::Copy,
            on_collision: CollisionPolicy::Skip,
            pad_width: 0,
            copy_workers: 4,
            filter: RecordFilter::default(),
            dry_run: false,
        }
    }
}

impl OrganizeConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self {
            link_mode: config.link_mode,
            on_collision: config.on_collision,
            pad_width: config.pad_width,
            copy_workers: config.copy_workers,
            filter: RecordFilter::from_config(&config.filters)?,
            dry_run: config.dry_run,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub new_name: String,
    pub original_name: String,
    pub src_path: PathBuf,
}

/// One organized series directory.
#[derive(Debug, Clone)]
pub struct OrganizedTest {
    pub target_dir: PathBuf,
    pub strategy: OrderingStrategy,
    pub manifest: Vec<ManifestEntry>,
    /// Records dropped because another record had the same instance UID.
    pub duplicates_dropped: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OrganizedTest {
    pub fn manifest_table(&self) -> Table {
        let mut table = Table::new(["new_name", "original_name", "src_path"]);
        for entry in &self.manifest {
            table.push_row(vec![
                entry.new_name.clone(),
                entry.original_name.clone(),
                entry.src_path.to_string_lossy().into_owned(),
            ]);
        }
        table
    }
}

/// Zero-padding width for a group of `group_size` files.
pub fn pad_width(configured: usize, group_size: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        group_size.to_string().len().max(4)
    }
}

/// Sequential name for the 1-based `index`, keeping the source extension.
pub fn sequential_name(index: usize, width: usize, source: &Path) -> String {
    let (_, extension) = split_extension(source);
    format!("{:0width$}{}", index, extension, width = width)
}

/// Directory name of a test, built from its first record.
pub fn test_dir_name(record: &InstanceRecord) -> String {
    format!(
        "Test_{}__{}__Series_{}_{}",
        sanitize(record.get(PATIENT_NAME)),
        sanitize(record.get(PROTOCOL_NORM)),
        sanitize(record.get(SERIES_NUMBER).or_else(|| record.get(SERIES_UID))),
        sanitize(record.get(SERIES_UID)),
    )
}

/// Keeps the first record of every instance UID. Records without one are
/// all kept.
pub fn dedupe_by_instance_uid<'a>(sorted: Vec<&'a InstanceRecord>) -> (Vec<&'a InstanceRecord>, usize) {
    let mut seen: AHashSet<&'a str> = AHashSet::new();
    let before = sorted.len();
    let kept: Vec<&'a InstanceRecord> = sorted
        .into_iter()
        .filter(|&r| match r.get_non_empty(SOP_INSTANCE_UID) {
            Some(uid) => seen.insert(uid),
            None => true,
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Filters, groups, orders, renames and materializes records into
/// `output_dir`, one directory per group of `grouping_keys`.
///
/// Failures are per file: a record that cannot be placed is left out of
/// its manifest and the run carries on. Only failing to build the copy
/// worker pool is an error.
pub fn organize(
    records: &[&InstanceRecord],
    grouping_keys: &[&str],
    output_dir: &Path,
    config: &OrganizeConfig,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<OrganizedTest>, Error> {
    let start = Instant::now();
    let selected: Vec<&InstanceRecord> = records
        .iter()
        .copied()
        .filter(|r| config.filter.matches(r))
        .collect();
    let groups = crate::aggregate::group_indices(&selected, grouping_keys);
    info!(
        "Organizing {} records into {} tests ({}, on collision {})",
        selected.len(),
        groups.len(),
        config.link_mode,
        config.on_collision,
    );
    let total = groups.len();
    reporter.on_organize_start(total);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.copy_workers.max(1))
        .build()?;

    let mut tests = Vec::with_capacity(total);
    let mut used_dirs: AHashSet<String> = AHashSet::new();
    for (done, (_, members)) in groups.into_iter().enumerate() {
        let members: Vec<&InstanceRecord> = members.into_iter().map(|i| selected[i]).collect();
        if let Some(first) = members.first() {
            let dir_name = unique_dir_name(test_dir_name(first), &mut used_dirs);
            let test = organize_group(&members, output_dir.join(dir_name), config, &pool);
            tests.push(test);
        }
        reporter.on_organize_progress(done + 1, total);
    }

    let placed: usize = tests.iter().map(|t| t.manifest.len()).sum();
    debug!(
        "Organize completed in {:.2}s: {} tests, {} files",
        start.elapsed().as_secs_f64(),
        tests.len(),
        placed,
    );
    reporter.on_organize_complete(placed, start.elapsed().as_secs_f64());
    Ok(tests)
}

/// Reserves `name` for this run, suffixing `__N` when another group
/// already sanitized to the same directory name.
pub fn unique_dir_name(name: String, used: &mut AHashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}__{}", name, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn organize_group(
    members: &[&InstanceRecord],
    target_dir: PathBuf,
    config: &OrganizeConfig,
    pool: &rayon::ThreadPool,
) -> OrganizedTest {
    let (strategy, sorted) = sort_group(members);
    let (ordered, duplicates_dropped) = dedupe_by_instance_uid(sorted);
    let width = pad_width(config.pad_width, ordered.len());

    // Destinations are distinct within a group, so placement needs no locking.
    let jobs: Vec<(&InstanceRecord, String)> = ordered
        .iter()
        .enumerate()
        .filter(|(_, r)| r.path.is_file())
        .map(|(i, r)| (*r, sequential_name(i + 1, width, &r.path)))
        .collect();

    let mut test = OrganizedTest {
        target_dir,
        strategy,
        manifest: Vec::with_capacity(jobs.len()),
        duplicates_dropped,
        skipped: 0,
        failed: ordered.len() - jobs.len(),
    };

    if config.dry_run {
        test.manifest = jobs
            .into_iter()
            .map(|(r, new_name)| manifest_entry(r, new_name))
            .collect();
        return test;
    }

    if let Err(e) = fs::create_dir_all(&test.target_dir) {
        warn!("Cannot create {}: {}", test.target_dir.display(), e);
        test.failed += jobs.len();
        return test;
    }

    let placements: Vec<Placement> = pool.install(|| {
        jobs.par_iter()
            .map(|(r, new_name)| {
                materialize(
                    &r.path,
                    &test.target_dir.join(new_name),
                    config.link_mode,
                    config.on_collision,
                )
            })
            .collect()
    });

    for ((record, _), placement) in jobs.into_iter().zip(placements) {
        match placement {
            Placement::Placed(dst) => {
                test.manifest.push(manifest_entry(record, file_name_of(&dst)));
            }
            Placement::Skipped(dst) => {
                test.skipped += 1;
                test.manifest.push(manifest_entry(record, file_name_of(&dst)));
            }
            Placement::Failed(e) => {
                warn!("Failed to place {}: {}", record.path.display(), e);
                test.failed += 1;
            }
        }
    }

    if !test.manifest.is_empty() {
        let manifest_path = test.target_dir.join(MANIFEST_FILE);
        if let Err(e) = test.manifest_table().write_csv(&manifest_path) {
            warn!("Cannot write {}: {}", manifest_path.display(), e);
        }
    }

    test
}

fn manifest_entry(record: &InstanceRecord, new_name: String) -> ManifestEntry {
    ManifestEntry {
        new_name,
        original_name: record.file_name(),
        src_path: record.path.clone(),
    }
}
