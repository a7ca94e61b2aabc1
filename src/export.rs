use crate::aggregate::{acquisition_summary, aggregate, partition, present_keys, series_table, SERIES_KEYS};
use crate::error::Error;
use crate::qa::QaReport;
use crate::record::{InstanceRecord, PATIENT_ID, PROTOCOL_EFFECTIVE, PROTOCOL_NORM};
use crate::table::{instance_table, Table};
use crate::utils::sanitize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const INSTANCES_FILE: &str = "global_index_instances.csv";
pub const SERIES_FILE: &str = "global_index_series.csv";
pub const CT_SUMMARY_FILE: &str = "summary_ct_params_by_patient_protocol.csv";

pub const QA_HIERARCHY_FILE: &str = "qa_hierarchy_counts.csv";
pub const QA_DUPLICATES_FILE: &str = "qa_duplicates_sop.csv";
pub const QA_GAPS_FILE: &str = "qa_instance_gaps.csv";
pub const QA_MISSING_FILE: &str = "qa_missing_critical_tags.csv";

pub fn patients_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("csv").join("patients")
}

pub fn patient_protocols_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("csv").join("patient_protocols")
}

pub fn qa_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("qa")
}

/// Writes the metadata tables under `output_dir`:
///
/// - `global_index_instances.csv` and `global_index_series.csv`
/// - `csv/patients/patient_<id>_{instances,series}.csv`
/// - `csv/patient_protocols/patient_<id>__protocol_<label>_instances.csv`
/// - `csv/patient_protocols/summary_ct_params_by_patient_protocol.csv`
///
/// Returns the paths written, in write order.
pub fn export_metadata(records: &[&InstanceRecord], output_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut written = Vec::new();
    let series_keys = present_keys(records, &SERIES_KEYS);

    write(&instance_table(records), output_dir.join(INSTANCES_FILE), &mut written)?;
    let series = series_table(&aggregate(records, &series_keys), &series_keys);
    write(&series, output_dir.join(SERIES_FILE), &mut written)?;

    let has_patient = records.iter().any(|r| r.has_column(PATIENT_ID));
    if has_patient {
        let dir = patients_dir(output_dir);
        for (key, subset) in partition(records, &[PATIENT_ID]) {
            let pid = sanitize(key[0].as_deref());
            write(
                &instance_table(&subset),
                dir.join(format!("patient_{}_instances.csv", pid)),
                &mut written,
            )?;
            let patient_series = series_table(&aggregate(&subset, &series_keys), &series_keys);
            write(
                &patient_series,
                dir.join(format!("patient_{}_series.csv", pid)),
                &mut written,
            )?;
        }
    }

    let has_protocol = records.iter().any(|r| r.has_column(PROTOCOL_NORM));
    if has_patient && has_protocol {
        let dir = patient_protocols_dir(output_dir);
        for (key, subset) in partition(records, &[PATIENT_ID, PROTOCOL_EFFECTIVE]) {
            let name = format!(
                "patient_{}__protocol_{}_instances.csv",
                sanitize(key[0].as_deref()),
                sanitize(key[1].as_deref()),
            );
            write(&instance_table(&subset), dir.join(name), &mut written)?;
        }
        write(&acquisition_summary(records), dir.join(CT_SUMMARY_FILE), &mut written)?;
    }

    debug!("Exported {} metadata tables to {}", written.len(), output_dir.display());
    Ok(written)
}

/// Writes each non-empty QA table under `<output_dir>/qa`.
pub fn export_qa(report: &QaReport<'_>, output_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let dir = qa_dir(output_dir);
    let mut written = Vec::new();
    let tables = [
        (report.hierarchy.clone(), QA_HIERARCHY_FILE),
        (report.duplicates_table(), QA_DUPLICATES_FILE),
        (report.gaps_table(), QA_GAPS_FILE),
        (report.missing_critical_table(), QA_MISSING_FILE),
    ];
    for (table, file) in tables {
        if !table.is_empty() {
            write(&table, dir.join(file), &mut written)?;
        }
    }
    Ok(written)
}

fn write(table: &Table, path: PathBuf, written: &mut Vec<PathBuf>) -> Result<(), Error> {
    table.write_csv(&path)?;
    written.push(path);
    Ok(())
}
