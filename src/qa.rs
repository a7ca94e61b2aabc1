//! Quality checks over the enriched record set.
//!
//! Every analysis returns an empty result when the attributes it needs are
//! not present in any record.

use crate::aggregate::{group_indices, present_keys};
use crate::record::{
    InstanceRecord, INSTANCE_NUMBER, PATH, PATIENT_ID, PROTOCOL_NAME, SERIES_DESCRIPTION,
    SERIES_UID, SOP_INSTANCE_UID, STUDY_UID,
};
use crate::table::{instance_table, Table};
use ahash::AHashMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

pub const HIERARCHY_KEYS: [&str; 5] = [
    PATIENT_ID,
    STUDY_UID,
    SERIES_UID,
    PROTOCOL_NAME,
    SERIES_DESCRIPTION,
];

pub const CRITICAL_KEYS: [&str; 4] = [PATIENT_ID, STUDY_UID, SERIES_UID, SOP_INSTANCE_UID];

/// Instance numbers beyond 2^53 are not exact integers and are ignored.
const MAX_EXACT_INSTANCE: f64 = 9_007_199_254_740_992.0;

/// Missing instance numbers listed per series before the list is cut.
pub const MISSING_LIST_LIMIT: usize = 50;

/// Instance-number coverage of one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceGap {
    pub series_uid: Option<String>,
    pub min: i64,
    pub max: i64,
    pub n_expected: u64,
    pub n_actual: u64,
    pub n_missing: u64,
    /// At most `MISSING_LIST_LIMIT` entries, ascending.
    pub missing: Vec<i64>,
    pub truncated: bool,
}

impl InstanceGap {
    pub fn missing_list(&self) -> String {
        let mut text = self
            .missing
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if self.truncated {
            text.push('…');
        }
        text
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QaSummary {
    pub series_with_gaps: usize,
    pub duplicate_rows: usize,
    pub rows_missing_critical: usize,
}

#[derive(Debug)]
pub struct QaReport<'a> {
    pub hierarchy: Table,
    pub duplicates: Vec<&'a InstanceRecord>,
    pub gaps: Vec<InstanceGap>,
    pub missing_critical: Vec<&'a InstanceRecord>,
}

impl<'a> QaReport<'a> {
    pub fn summary(&self) -> QaSummary {
        QaSummary {
            series_with_gaps: self.gaps.iter().filter(|g| g.n_missing > 0).count(),
            duplicate_rows: self.duplicates.len(),
            rows_missing_critical: self.missing_critical.len(),
        }
    }

    pub fn duplicates_table(&self) -> Table {
        instance_table(&self.duplicates)
    }

    pub fn gaps_table(&self) -> Table {
        let mut table = Table::new([
            SERIES_UID,
            "min",
            "max",
            "n_expected",
            "n_actual",
            "n_missing",
            "missing_list",
        ]);
        for gap in &self.gaps {
            table.push_row(vec![
                gap.series_uid.clone().unwrap_or_default(),
                gap.min.to_string(),
                gap.max.to_string(),
                gap.n_expected.to_string(),
                gap.n_actual.to_string(),
                gap.n_missing.to_string(),
                gap.missing_list(),
            ]);
        }
        table
    }

    pub fn missing_critical_table(&self) -> Table {
        let mut table = Table::new(CRITICAL_KEYS.iter().copied().chain([PATH]));
        for record in &self.missing_critical {
            let mut row: Vec<String> = CRITICAL_KEYS.iter().map(|k| record.cell(k)).collect();
            row.push(record.cell(PATH));
            table.push_row(row);
        }
        table
    }
}

pub fn run_qa<'a>(records: &[&'a InstanceRecord]) -> QaReport<'a> {
    QaReport {
        hierarchy: hierarchy_counts(records),
        duplicates: duplicates(records),
        gaps: instance_gaps(records),
        missing_critical: missing_critical_tags(records),
    }
}

/// Instance counts per patient / study / series / protocol / description,
/// over whichever of those columns exist.
pub fn hierarchy_counts(records: &[&InstanceRecord]) -> Table {
    let keys = present_keys(records, &HIERARCHY_KEYS);
    if keys.is_empty() {
        return Table::default();
    }
    let by_uid = records.iter().any(|r| r.has_column(SOP_INSTANCE_UID));

    let mut table = Table::new(keys.iter().copied().chain(["n_instances"]));
    for (key, members) in group_indices(records, &keys) {
        let n = if by_uid {
            members
                .iter()
                .filter(|&&i| records[i].get_non_empty(SOP_INSTANCE_UID).is_some())
                .count()
        } else {
            members.len()
        };
        let mut row: Vec<String> = key.into_iter().map(Option::unwrap_or_default).collect();
        row.push(n.to_string());
        table.push_row(row);
    }
    table
}

/// All records whose instance UID occurs more than once, sorted by
/// UID, series, then instance number (or path when not numeric).
pub fn duplicates<'a>(records: &[&'a InstanceRecord]) -> Vec<&'a InstanceRecord> {
    let mut counts: AHashMap<&str, usize> = AHashMap::new();
    for record in records {
        if let Some(uid) = record.get_non_empty(SOP_INSTANCE_UID) {
            *counts.entry(uid).or_default() += 1;
        }
    }

    let mut dups: Vec<&'a InstanceRecord> = records
        .iter()
        .copied()
        .filter(|r| {
            r.get_non_empty(SOP_INSTANCE_UID)
                .is_some_and(|uid| counts.get(uid).copied().unwrap_or(0) > 1)
        })
        .collect();
    dups.sort_by(|a, b| {
        a.get(SOP_INSTANCE_UID)
            .cmp(&b.get(SOP_INSTANCE_UID))
            .then_with(|| a.get(SERIES_UID).cmp(&b.get(SERIES_UID)))
            .then_with(|| compare_order(a, b))
    });
    dups
}

fn compare_order(a: &InstanceRecord, b: &InstanceRecord) -> Ordering {
    match (a.number(INSTANCE_NUMBER), b.number(INSTANCE_NUMBER)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.path.cmp(&b.path)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    }
}

/// Missing instance numbers per series. Series without a single numeric
/// instance number are skipped.
pub fn instance_gaps(records: &[&InstanceRecord]) -> Vec<InstanceGap> {
    if !records.iter().any(|r| r.has_column(INSTANCE_NUMBER))
        || !records.iter().any(|r| r.has_column(SERIES_UID))
    {
        return Vec::new();
    }

    group_indices(records, &[SERIES_UID])
        .into_iter()
        .filter_map(|(mut key, members)| {
            let observed: BTreeSet<i64> = members
                .iter()
                .filter_map(|&i| records[i].number(INSTANCE_NUMBER))
                .filter(|n| n.abs() <= MAX_EXACT_INSTANCE)
                .map(|n| n as i64)
                .collect();
            let min = *observed.first()?;
            let max = *observed.last()?;
            Some(gap_of(key.pop().flatten(), min, max, &observed))
        })
        .collect()
}

fn gap_of(series_uid: Option<String>, min: i64, max: i64, observed: &BTreeSet<i64>) -> InstanceGap {
    let n_expected = max.abs_diff(min).saturating_add(1);
    let n_actual = observed.len() as u64;
    let n_missing = n_expected.saturating_sub(n_actual);

    // Walk the range lazily so a huge span never materializes.
    let missing: Vec<i64> = (min..=max)
        .filter(|n| !observed.contains(n))
        .take(MISSING_LIST_LIMIT)
        .collect();

    InstanceGap {
        series_uid,
        min,
        max,
        n_expected,
        n_actual,
        n_missing,
        missing,
        truncated: n_missing > MISSING_LIST_LIMIT as u64,
    }
}

/// Records lacking a non-empty value for any critical identifier.
pub fn missing_critical_tags<'a>(records: &[&'a InstanceRecord]) -> Vec<&'a InstanceRecord> {
    records
        .iter()
        .copied()
        .filter(|r| CRITICAL_KEYS.iter().any(|k| r.get_non_empty(k).is_none()))
        .collect()
}
