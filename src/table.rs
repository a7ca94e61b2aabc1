use crate::error::Error;
use crate::reader::DEFAULT_KEYS;
use crate::record::{InstanceRecord, PATH, PROTOCOL_EFFECTIVE, PROTOCOL_NORM, SIZE_BYTES};
use ahash::AHashSet;
use std::fs;
use std::path::Path;

/// Rectangular string table written as CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Union of attribute columns across `records`, computed in one pass.
/// Fixed-mode keys keep their declared order, other attributes follow
/// alphabetically, then the derived path/size/protocol columns.
pub fn attribute_columns(records: &[&InstanceRecord]) -> Vec<String> {
    let mut seen: AHashSet<&str> = AHashSet::new();
    for record in records {
        for key in record.attributes.keys() {
            seen.insert(key.as_str());
        }
    }

    let mut columns: Vec<String> = DEFAULT_KEYS
        .iter()
        .filter(|k| seen.remove(**k))
        .map(|k| k.to_string())
        .collect();
    let mut rest: Vec<&str> = seen.into_iter().collect();
    rest.sort_unstable();
    columns.extend(rest.into_iter().map(String::from));
    columns
}

/// One row per record with the union of all attribute columns.
pub fn instance_table(records: &[&InstanceRecord]) -> Table {
    let mut columns = attribute_columns(records);
    columns.push(PATH.to_string());
    columns.push(SIZE_BYTES.to_string());
    if records.iter().any(|r| r.protocol_norm.is_some()) {
        columns.push(PROTOCOL_EFFECTIVE.to_string());
        columns.push(PROTOCOL_NORM.to_string());
    }

    let mut table = Table::new(columns.iter().cloned());
    for record in records {
        table.push_row(columns.iter().map(|c| record.cell(c)).collect());
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;
    use tempfile::tempdir;

    #[test]
    fn test_instance_table_column_union_has_no_ragged_rows() {
        let a = record("/a", &[("PatientID", "P1"), ("Zeta", "z")]);
        let b = record("/b", &[("Modality", "CT"), ("Alpha", "1")]);
        let table = instance_table(&[&a, &b]);

        assert_eq!(
            table.columns(),
            &["PatientID", "Modality", "Alpha", "Zeta", "_path", "_size_bytes"]
        );
        assert!(table.rows().iter().all(|r| r.len() == table.columns().len()));
        assert_eq!(table.rows()[1], vec!["", "CT", "1", "", "/b", "128"]);
    }

    #[test]
    fn test_write_csv_creates_parent_dirs() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("csv").join("patients").join("t.csv");
        let mut table = Table::new(["a", "b"]);
        table.push_row(vec!["1".to_string(), "x,y".to_string()]);
        table.write_csv(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a,b\n1,\"x,y\"\n");
    }
}
