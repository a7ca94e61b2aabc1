use clap::{Args, Parser, Subcommand};
use dicom_organizer::config::{AppConfig, CollisionPolicy, LinkMode};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dicom-organizer")]
#[command(about = "Index, organize and check DICOM exports", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index, organize, export tables and run QA
    Process(ProcessArgs),
    /// Read a sample of the discovered files and summarize them
    Preview(PreviewArgs),
    /// Print configuration values
    PrintConfig,
}

/// Options shared by every command that discovers files.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Root holding a DICOMDIR or the dicom folder
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Folder under the input root to walk when there is no DICOMDIR
    #[arg(long)]
    pub dicom_folder: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output directory, relative to the input root unless absolute
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Protocol rules file (TOML)
    #[arg(long)]
    pub rules: Option<PathBuf>,
    #[arg(long)]
    pub read_workers: Option<usize>,
    #[arg(long)]
    pub copy_workers: Option<usize>,
    /// Extract every attribute instead of the fixed key set
    #[arg(long)]
    pub all_tags: bool,
    #[arg(long)]
    pub no_organize: bool,
    #[arg(long)]
    pub no_export: bool,
    #[arg(long)]
    pub no_qa: bool,
    /// Plan names and manifests without writing anything
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long, value_enum)]
    pub link_mode: Option<LinkMode>,
    #[arg(long, value_enum)]
    pub on_collision: Option<CollisionPolicy>,
    /// Digits in sequential names, 0 picks from the group size
    #[arg(long)]
    pub pad_width: Option<usize>,
    /// Keep only these modalities (repeatable)
    #[arg(long = "modality")]
    pub modalities: Vec<String>,
    /// Inclusive StudyDate range, YYYYMMDD:YYYYMMDD
    #[arg(long)]
    pub date_range: Option<String>,
    /// Keep only these patient IDs (repeatable)
    #[arg(long = "patient-id")]
    pub patient_ids: Vec<String>,
    /// Keep protocols matching this regex
    #[arg(long)]
    pub protocol_include: Option<String>,
    /// Drop protocols matching this regex
    #[arg(long)]
    pub protocol_exclude: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Number of files to sample
    #[arg(long, default_value_t = dicom_organizer::preview::DEFAULT_SAMPLE_SIZE)]
    pub sample: usize,
}

impl InputArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(folder) = &self.dicom_folder {
            config.dicom_folder = folder.clone();
        }
    }
}

impl ProcessArgs {
    /// Command-line flags override file and environment configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        self.input.apply(config);
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(rules) = &self.rules {
            config.rules_path = Some(rules.clone());
        }
        if let Some(n) = self.read_workers {
            config.read_workers = n;
        }
        if let Some(n) = self.copy_workers {
            config.copy_workers = n;
        }
        config.all_tags |= self.all_tags;
        config.organize &= !self.no_organize;
        config.export_metadata &= !self.no_export;
        config.qa &= !self.no_qa;
        config.dry_run |= self.dry_run;
        if let Some(mode) = self.link_mode {
            config.link_mode = mode;
        }
        if let Some(policy) = self.on_collision {
            config.on_collision = policy;
        }
        if let Some(width) = self.pad_width {
            config.pad_width = width;
        }

        let filters = &mut config.filters;
        if !self.modalities.is_empty() {
            filters.modalities = self.modalities.clone();
        }
        if !self.patient_ids.is_empty() {
            filters.patient_ids = self.patient_ids.clone();
        }
        if self.date_range.is_some() {
            filters.date_range = self.date_range.clone();
        }
        if self.protocol_include.is_some() {
            filters.protocol_include = self.protocol_include.clone();
        }
        if self.protocol_exclude.is_some() {
            filters.protocol_exclude = self.protocol_exclude.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "dicom-organizer",
            "process",
            "--input",
            "/cd",
            "--no-qa",
            "--link-mode",
            "hardlink",
            "--on-collision",
            "rename",
            "--modality",
            "CT",
            "--modality",
            "MR",
        ]);
        let Some(Commands::Process(args)) = cli.command else {
            panic!("expected process command");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.input, PathBuf::from("/cd"));
        assert!(!config.qa);
        assert!(config.organize);
        assert_eq!(config.link_mode, LinkMode::Hardlink);
        assert_eq!(config.on_collision, CollisionPolicy::Rename);
        assert_eq!(config.filters.modalities, vec!["CT", "MR"]);
    }
}
