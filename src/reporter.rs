use dicom_organizer::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Index phase: bar over the discovered files
/// - Organize phase: bar over the series groups
/// - Export phase: spinner
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn counting_bar(total: usize, label: &str, unit: &str) -> ProgressBar {
        let pb = ProgressBar::new(total as u64);
        let template = format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {} ({{eta}} remaining)",
            label, unit
        );
        let style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICKS);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

impl ProgressReporter for CliReporter {
    fn on_discovery_complete(&self, total_files: usize, duration_secs: f64) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Discovery complete: {} files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_index_start(&self, total_files: usize) {
        self.set_bar(Self::counting_bar(total_files, "Indexing", "files"));
    }

    fn on_index_progress(&self, files_read: usize, _total_files: usize) {
        self.with_bar(|pb| pb.set_position(files_read as u64));
    }

    fn on_index_complete(&self, indexed: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Index complete: {} instances, {} unreadable in {:.2}s",
            indexed, failed, duration_secs
        );
    }

    fn on_organize_start(&self, total_groups: usize) {
        self.set_bar(Self::counting_bar(total_groups, "Organizing", "series"));
    }

    fn on_organize_progress(&self, groups_done: usize, _total_groups: usize) {
        self.with_bar(|pb| pb.set_position(groups_done as u64));
    }

    fn on_organize_complete(&self, files_placed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Organize complete: {} files in {:.2}s",
            files_placed, duration_secs
        );
    }

    fn on_export_start(&self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(TICKS),
        );
        pb.set_message("Writing tables...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_export_complete(&self, tables_written: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Export complete: {} tables in {:.2}s",
            tables_written, duration_secs
        );
    }
}
