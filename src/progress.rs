/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif bars, tests use `SilentReporter`.
/// All methods have default no-op implementations and may be called from
/// worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_discovery_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_index_start(&self, _total_files: usize) {}
    fn on_index_progress(&self, _files_read: usize, _total_files: usize) {}
    fn on_index_complete(&self, _indexed: usize, _failed: usize, _duration_secs: f64) {}
    fn on_organize_start(&self, _total_groups: usize) {}
    fn on_organize_progress(&self, _groups_done: usize, _total_groups: usize) {}
    fn on_organize_complete(&self, _files_placed: usize, _duration_secs: f64) {}
    fn on_export_start(&self) {}
    fn on_export_complete(&self, _tables_written: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
