use crate::error::Error;
use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How an organized file is materialized in its target directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    #[default]
    Copy,
    Hardlink,
    Symlink,
}

/// What to do when a destination path already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    #[default]
    Skip,
    Overwrite,
    Rename,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkMode::Copy => "copy",
            LinkMode::Hardlink => "hardlink",
            LinkMode::Symlink => "symlink",
        };
        f.write_str(s)
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollisionPolicy::Skip => "skip",
            CollisionPolicy::Overwrite => "overwrite",
            CollisionPolicy::Rename => "rename",
        };
        f.write_str(s)
    }
}

/// Record selection applied before organizing and exporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub modalities: Vec<String>,
    /// Inclusive `YYYYMMDD:YYYYMMDD` range over StudyDate, either side may be empty.
    pub date_range: Option<String>,
    pub patient_ids: Vec<String>,
    pub protocol_include: Option<String>,
    pub protocol_exclude: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root containing a DICOMDIR or the dicom folder.
    pub input: PathBuf,
    pub dicom_folder: String,
    /// Output directory, relative paths are resolved against `input`.
    pub output: PathBuf,
    pub rules_path: Option<PathBuf>,
    pub read_workers: usize,
    pub copy_workers: usize,
    pub all_tags: bool,
    pub export_metadata: bool,
    pub organize: bool,
    pub qa: bool,
    pub dry_run: bool,
    pub link_mode: LinkMode,
    pub on_collision: CollisionPolicy,
    /// Fixed width for sequential names, 0 picks it from the group size.
    pub pad_width: usize,
    pub ignore_patterns: Vec<String>,
    pub filters: FilterConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("."),
            dicom_folder: "dicom".to_string(),
            output: PathBuf::from("organized"),
            rules_path: None,
            read_workers: 8,
            copy_workers: 4,
            all_tags: false,
            export_metadata: true,
            organize: true,
            qa: true,
            dry_run: false,
            link_mode: LinkMode::Copy,
            on_collision: CollisionPolicy::Skip,
            pad_width: 0,
            ignore_patterns: Vec::new(),
            filters: FilterConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn output_dir(&self) -> PathBuf {
        if self.output.is_absolute() {
            self.output.clone()
        } else {
            self.input.join(&self.output)
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("DICOM_ORGANIZER").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Parses an inclusive `start:end` StudyDate range. Empty bounds are open.
pub fn parse_date_range(range: &str) -> Result<(NaiveDate, NaiveDate), Error> {
    let (start, end) = range
        .split_once(':')
        .ok_or_else(|| Error::DateRange(range.to_string()))?;
    let start = match start.trim() {
        "" => NaiveDate::MIN,
        s => parse_study_date(s).ok_or_else(|| Error::DateRange(range.to_string()))?,
    };
    let end = match end.trim() {
        "" => NaiveDate::MAX,
        s => parse_study_date(s).ok_or_else(|| Error::DateRange(range.to_string()))?,
    };
    Ok((start, end))
}

pub fn parse_study_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").ok()
}
