use crate::config::AppConfig;
use crate::error::Error;
use crate::export;
use crate::index::build_index;
use crate::organize::{self, OrganizeConfig};
use crate::progress::ProgressReporter;
use crate::protocol::{self, ProtocolRuleSet};
use crate::qa::{self, QaSummary};
use crate::reader::{DicomReader, MetadataReader, ReadMode};
use crate::record::{InstanceRecord, SERIES_UID};
use crate::scanner::{self, DiscoverySource};
use ahash::AHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome class of a run. `NoRecords` is a successful no-op that callers
/// may choose to treat as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    NoRecords,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseDurations {
    pub discovery_secs: f64,
    pub index_secs: f64,
    pub organize_secs: f64,
    pub export_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub discovery_source: String,
    pub total_files_seen: usize,
    pub indexed_instances: usize,
    /// Unreadable files keyed by failure reason.
    pub read_failures: BTreeMap<String, usize>,
    /// Instances left after filtering.
    pub selected_instances: usize,
    pub unique_series: usize,
    pub tests_created: usize,
    pub files_placed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub duplicates_dropped: usize,
    pub tables_written: usize,
    pub qa: Option<QaSummary>,
    pub output_dir: PathBuf,
    pub dry_run: bool,
    pub durations: PhaseDurations,
}

impl RunSummary {
    fn new(config: &AppConfig) -> Self {
        Self {
            status: RunStatus::Completed,
            discovery_source: String::new(),
            total_files_seen: 0,
            indexed_instances: 0,
            read_failures: BTreeMap::new(),
            selected_instances: 0,
            unique_series: 0,
            tests_created: 0,
            files_placed: 0,
            files_skipped: 0,
            files_failed: 0,
            duplicates_dropped: 0,
            tables_written: 0,
            qa: None,
            output_dir: config.output_dir(),
            dry_run: config.dry_run,
            durations: PhaseDurations::default(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        let d = &self.durations;
        Duration::from_secs_f64(d.discovery_secs + d.index_secs + d.organize_secs + d.export_secs)
    }
}

/// Runs discovery, indexing, protocol normalization and then the enabled
/// organize, export and QA stages.
pub struct RunEngine<R = DicomReader> {
    config: AppConfig,
    rules: ProtocolRuleSet,
    reader: R,
}

impl RunEngine<DicomReader> {
    pub fn new(config: AppConfig) -> Self {
        Self::with_reader(config, DicomReader)
    }
}

impl<R: MetadataReader> RunEngine<R> {
    pub fn with_reader(config: AppConfig, reader: R) -> Self {
        let rules = protocol::load_rules(config.rules_path.as_deref());
        Self {
            config,
            rules,
            reader,
        }
    }

    pub fn with_rules(mut self, rules: ProtocolRuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<RunSummary, Error> {
        let config = &self.config;
        // Bad filter patterns are the one configuration error worth failing on.
        let organize_config = OrganizeConfig::from_app_config(config)?;
        let mut summary = RunSummary::new(config);

        // Phase 1: Discovery
        let start = Instant::now();
        let discovery = scanner::discover(&config.input, &config.dicom_folder, &config.ignore_patterns)?;
        summary.durations.discovery_secs = start.elapsed().as_secs_f64();
        summary.total_files_seen = discovery.paths.len();
        summary.discovery_source = match &discovery.source {
            DiscoverySource::IndexFile(p) | DiscoverySource::FolderWalk(p) => p.display().to_string(),
        };
        reporter.on_discovery_complete(discovery.paths.len(), summary.durations.discovery_secs);
        debug!(
            "Discovery completed in {:.2}s: {} files",
            summary.durations.discovery_secs, summary.total_files_seen,
        );

        // Phase 2: Index
        let start = Instant::now();
        let mode = if config.all_tags {
            ReadMode::AllTags
        } else {
            ReadMode::Fixed
        };
        let outcome = build_index(&discovery.paths, config.read_workers, mode, &self.reader, reporter)?;
        summary.durations.index_secs = start.elapsed().as_secs_f64();
        summary.read_failures = outcome.failure_counts();
        summary.indexed_instances = outcome.records.len();

        if outcome.is_empty() {
            warn!("No DICOM instances could be indexed");
            summary.status = RunStatus::NoRecords;
            return Ok(summary);
        }

        let records = protocol::enrich(outcome.records, &self.rules);
        let selected = organize_config.filter.apply(&records);
        summary.selected_instances = selected.len();
        summary.unique_series = selected
            .iter()
            .filter_map(|r| r.get_non_empty(SERIES_UID))
            .collect::<AHashSet<_>>()
            .len();
        if !organize_config.filter.is_empty() {
            info!("{} of {} instances match the filters", selected.len(), records.len());
        }

        // Phase 3: Organize
        let output_dir = config.output_dir();
        if config.organize {
            let start = Instant::now();
            let tests = organize::organize(
                &selected,
                &organize::TEST_KEYS,
                &output_dir,
                &organize_config,
                reporter,
            )?;
            summary.durations.organize_secs = start.elapsed().as_secs_f64();
            summary.tests_created = tests.len();
            for test in &tests {
                summary.files_placed += test.manifest.len() - test.skipped;
                summary.files_skipped += test.skipped;
                summary.files_failed += test.failed;
                summary.duplicates_dropped += test.duplicates_dropped;
            }
        }

        // Phase 4: Export and QA
        if !config.dry_run && (config.export_metadata || config.qa) {
            let start = Instant::now();
            reporter.on_export_start();
            let written = self.export(&selected, &output_dir, &mut summary)?;
            summary.tables_written = written;
            summary.durations.export_secs = start.elapsed().as_secs_f64();
            reporter.on_export_complete(summary.tables_written, summary.durations.export_secs);
        }

        info!(
            "Run finished: {} instances, {} tests, {} files placed",
            summary.indexed_instances, summary.tests_created, summary.files_placed,
        );
        Ok(summary)
    }

    fn export(
        &self,
        records: &[&InstanceRecord],
        output_dir: &Path,
        summary: &mut RunSummary,
    ) -> Result<usize, Error> {
        let mut written = 0;
        if self.config.export_metadata {
            info!("Exporting metadata tables to {}", output_dir.display());
            written += export::export_metadata(records, output_dir)?.len();
        }
        if self.config.qa {
            let report = qa::run_qa(records);
            written += export::export_qa(&report, output_dir)?.len();
            summary.qa = Some(report.summary());
        }
        Ok(written)
    }
}
