use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use dicom_organizer::config::{CollisionPolicy, LinkMode};
use dicom_organizer::reader::{MetadataReader, ReadFailure, ReadMode};
use dicom_organizer::record::AttributeMap;
use dicom_organizer::{AppConfig, RunEngine, RunStatus, SilentReporter};

/// Reads `Key=Value` lines. Files starting with `NOT DICOM` are malformed.
struct TextReader;

impl MetadataReader for TextReader {
    fn read(&self, path: &Path, _mode: ReadMode) -> Result<AttributeMap, ReadFailure> {
        let text = fs::read_to_string(path).map_err(|e| ReadFailure::Unreadable(e.to_string()))?;
        if text.starts_with("NOT DICOM") {
            return Err(ReadFailure::Malformed("no preamble".to_string()));
        }
        Ok(text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect())
    }
}

fn instance(sop: &str, number: Option<u32>) -> String {
    let mut text = String::from(
        "PatientID=P001\nPatientName=DOE^JANE\nStudyInstanceUID=1.2\n\
         SeriesInstanceUID=1.2.3\nSeriesNumber=2\nModality=CT\nProtocolName=Torax AP\n",
    );
    text.push_str(&format!("SOPInstanceUID={}\n", sop));
    if let Some(n) = number {
        text.push_str(&format!("InstanceNumber={}\n", n));
    }
    text
}

/// Layout:
///   input/
///     rules.toml
///     dicom/
///       IM01.dcm .. IM06.dcm   SOP u1..u6, InstanceNumber 1..6
///       IM07.dcm               SOP u6 (duplicate of IM06), no InstanceNumber
///       IM08.dcm               SOP u7, no InstanceNumber
///       junk1.dcm, junk2.dcm   not DICOM
fn create_input(root: &Path) {
    let dicom = root.join("dicom");
    fs::create_dir_all(&dicom).unwrap();
    for n in 1..=6 {
        fs::write(dicom.join(format!("IM0{}.dcm", n)), instance(&format!("u{}", n), Some(n))).unwrap();
    }
    fs::write(dicom.join("IM07.dcm"), instance("u6", None)).unwrap();
    fs::write(dicom.join("IM08.dcm"), instance("u7", None)).unwrap();
    fs::write(dicom.join("junk1.dcm"), "NOT DICOM").unwrap();
    fs::write(dicom.join("junk2.dcm"), "NOT DICOM either").unwrap();

    fs::write(
        root.join("rules.toml"),
        "[protocol_map]\n\"Torax AP\" = \"CHEST\"\n",
    )
    .unwrap();
}

fn config_for(root: &Path) -> AppConfig {
    AppConfig {
        input: root.to_path_buf(),
        rules_path: Some(root.join("rules.toml")),
        read_workers: 2,
        copy_workers: 2,
        ..AppConfig::default()
    }
}

fn line_count(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

fn test_dir(root: &Path) -> PathBuf {
    root.join("organized").join("Test_DOE_JANE__CHEST__Series_2_1.2.3")
}

#[test]
fn test_full_pipeline() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    let engine = RunEngine::with_reader(config_for(&root), TextReader);
    let summary = engine.run(&SilentReporter).unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.total_files_seen, 10);
    assert_eq!(summary.indexed_instances, 8);
    assert_eq!(summary.read_failures.get("malformed"), Some(&2));
    assert_eq!(summary.unique_series, 1);
    assert_eq!(summary.tests_created, 1);
    assert_eq!(summary.files_placed, 7);
    assert_eq!(summary.duplicates_dropped, 1);
    assert_eq!(summary.files_failed, 0);

    let out = root.join("organized");
    assert_eq!(line_count(&out.join("global_index_instances.csv")), 9);

    let series = fs::read_to_string(out.join("global_index_series.csv")).unwrap();
    let mut lines = series.lines();
    assert_eq!(
        lines.next(),
        Some("PatientID,StudyInstanceUID,SeriesInstanceUID,SeriesNumber,ProtocolNorm,Modality,n_instances,instance_min,instance_max")
    );
    assert_eq!(lines.next(), Some("P001,1.2,1.2.3,2,CHEST,CT,7,1,6"));
    assert_eq!(lines.next(), None);

    assert!(out.join("csv/patients/patient_P001_instances.csv").is_file());
    assert!(out.join("csv/patients/patient_P001_series.csv").is_file());
    assert!(out.join("csv/patient_protocols/patient_P001__protocol_Torax AP_instances.csv").is_file());
    assert!(out.join("csv/patient_protocols/summary_ct_params_by_patient_protocol.csv").is_file());

    // QA: the two rows sharing u6, a dense 1..6 range, nothing missing.
    let qa = out.join("qa");
    assert_eq!(line_count(&qa.join("qa_duplicates_sop.csv")), 3);
    let gaps = fs::read_to_string(qa.join("qa_instance_gaps.csv")).unwrap();
    assert_eq!(gaps.lines().nth(1), Some("1.2.3,1,6,6,6,0,"));
    assert!(!qa.join("qa_missing_critical_tags.csv").exists());
    let qa_summary = summary.qa.unwrap();
    assert_eq!(qa_summary.series_with_gaps, 0);
    assert_eq!(qa_summary.duplicate_rows, 2);
    assert_eq!(qa_summary.rows_missing_critical, 0);

    // Unnumbered records sort first, the numbered copy of u6 is dropped.
    let dir = test_dir(&root);
    let manifest = fs::read_to_string(dir.join("manifest.csv")).unwrap();
    let rows: Vec<&str> = manifest.lines().collect();
    assert_eq!(rows.len(), 8);
    assert_eq!(rows[0], "new_name,original_name,src_path");
    assert!(rows[1].starts_with("0001.dcm,IM07.dcm,"));
    assert!(rows[2].starts_with("0002.dcm,IM08.dcm,"));
    assert!(rows[3].starts_with("0003.dcm,IM01.dcm,"));
    assert!(rows[7].starts_with("0007.dcm,IM05.dcm,"));
    assert!(dir.join("0007.dcm").is_file());
    assert!(!dir.join("0008.dcm").exists());
    assert_eq!(
        fs::read_to_string(dir.join("0003.dcm")).unwrap(),
        instance("u1", Some(1))
    );
}

#[test]
fn test_rerun_with_rename_keeps_existing_files() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    let first = RunEngine::with_reader(config_for(&root), TextReader)
        .run(&SilentReporter)
        .unwrap();
    assert_eq!(first.files_placed, 7);

    let config = AppConfig {
        on_collision: CollisionPolicy::Rename,
        export_metadata: false,
        qa: false,
        ..config_for(&root)
    };
    let second = RunEngine::with_reader(config, TextReader).run(&SilentReporter).unwrap();
    assert_eq!(second.files_placed, 7);
    assert_eq!(second.tables_written, 0);

    let dir = test_dir(&root);
    assert!(dir.join("0001.dcm").is_file());
    assert!(dir.join("0001__1.dcm").is_file());
    assert!(dir.join("0007__1.dcm").is_file());
    let manifest = fs::read_to_string(dir.join("manifest.csv")).unwrap();
    assert!(manifest.lines().nth(1).unwrap().starts_with("0001__1.dcm,IM07.dcm,"));
}

#[test]
fn test_rerun_with_skip_is_idempotent() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    RunEngine::with_reader(config_for(&root), TextReader)
        .run(&SilentReporter)
        .unwrap();
    let second = RunEngine::with_reader(config_for(&root), TextReader)
        .run(&SilentReporter)
        .unwrap();

    assert_eq!(second.files_placed, 0);
    assert_eq!(second.files_skipped, 7);
    let entries = fs::read_dir(test_dir(&root)).unwrap().count();
    assert_eq!(entries, 8);
}

#[test]
fn test_dry_run_writes_nothing() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    let config = AppConfig {
        dry_run: true,
        ..config_for(&root)
    };
    let summary = RunEngine::with_reader(config, TextReader).run(&SilentReporter).unwrap();

    assert_eq!(summary.tests_created, 1);
    assert_eq!(summary.files_placed, 7);
    assert_eq!(summary.tables_written, 0);
    assert!(summary.qa.is_none());
    assert!(!root.join("organized").exists());
}

#[test]
fn test_filters_exclude_records() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    let mut config = config_for(&root);
    config.filters.modalities = vec!["MR".to_string()];
    let summary = RunEngine::with_reader(config, TextReader).run(&SilentReporter).unwrap();

    assert_eq!(summary.indexed_instances, 8);
    assert_eq!(summary.selected_instances, 0);
    assert_eq!(summary.tests_created, 0);
}

#[test]
fn test_invalid_filter_pattern_is_an_error() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    let mut config = config_for(&root);
    config.filters.protocol_include = Some("([".to_string());
    let result = RunEngine::with_reader(config, TextReader).run(&SilentReporter);
    assert!(result.is_err());
}

#[test]
fn test_no_records_is_a_successful_no_op() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    let dicom = root.join("dicom");
    fs::create_dir_all(&dicom).unwrap();
    fs::write(dicom.join("junk"), "NOT DICOM").unwrap();

    let config = AppConfig {
        input: root.clone(),
        ..AppConfig::default()
    };
    let summary = RunEngine::with_reader(config, TextReader).run(&SilentReporter).unwrap();

    assert_eq!(summary.status, RunStatus::NoRecords);
    assert_eq!(summary.total_files_seen, 1);
    assert_eq!(summary.indexed_instances, 0);
    assert!(!root.join("organized").exists());
}

#[test]
fn test_symlink_mode_links_sources() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("cd");
    create_input(&root);

    let config = AppConfig {
        link_mode: LinkMode::Symlink,
        export_metadata: false,
        qa: false,
        ..config_for(&root)
    };
    let summary = RunEngine::with_reader(config, TextReader).run(&SilentReporter).unwrap();

    assert_eq!(summary.files_placed, 7);
    let placed = test_dir(&root).join("0003.dcm");
    assert_eq!(fs::read_to_string(placed).unwrap(), instance("u1", Some(1)));
}
