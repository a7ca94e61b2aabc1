use crate::record::{
    InstanceRecord, INSTANCE_NUMBER, MODALITY, PATIENT_ID, PATIENT_NAME, PROTOCOL_NORM,
    SERIES_NUMBER, SERIES_UID, SOP_INSTANCE_UID, STUDY_UID,
};
use crate::table::Table;
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeSet;

/// Grouping keys of the global series table.
pub const SERIES_KEYS: [&str; 6] = [
    PATIENT_ID,
    STUDY_UID,
    SERIES_UID,
    SERIES_NUMBER,
    PROTOCOL_NORM,
    MODALITY,
];

/// Key tuple; `None` is the "missing" bucket for a record without the attribute.
pub type GroupKey = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup {
    pub key: GroupKey,
    /// Every member record.
    pub n_records: usize,
    /// Distinct unique-instance identifiers among the members, or
    /// `n_records` when no record in the whole set carries one.
    pub n_instances: usize,
    pub instance_min: Option<f64>,
    pub instance_max: Option<f64>,
}

/// Keys from `candidates` that at least one record carries as a column.
pub fn present_keys<'k>(records: &[&InstanceRecord], candidates: &[&'k str]) -> Vec<&'k str> {
    candidates
        .iter()
        .copied()
        .filter(|k| records.iter().any(|r| r.has_column(k)))
        .collect()
}

pub fn key_of(record: &InstanceRecord, keys: &[&str]) -> GroupKey {
    keys.iter().map(|k| record.get(k).map(String::from)).collect()
}

/// Groups records by `keys` in first-seen order. Records missing a key fall
/// into that key's `None` bucket, nothing is dropped.
pub fn group_indices(records: &[&InstanceRecord], keys: &[&str]) -> Vec<(GroupKey, Vec<usize>)> {
    let mut slots: AHashMap<GroupKey, usize> = AHashMap::new();
    let mut groups: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let key = key_of(record, keys);
        match slots.get(&key) {
            Some(&slot) => groups[slot].1.push(i),
            None => {
                slots.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }
    groups
}

pub fn aggregate(records: &[&InstanceRecord], keys: &[&str]) -> Vec<SeriesGroup> {
    let count_by_uid = records.iter().any(|r| r.has_column(SOP_INSTANCE_UID));

    group_indices(records, keys)
        .into_iter()
        .map(|(key, members)| {
            let n_instances = if count_by_uid {
                members
                    .iter()
                    .filter_map(|&i| records[i].get_non_empty(SOP_INSTANCE_UID))
                    .collect::<AHashSet<_>>()
                    .len()
            } else {
                members.len()
            };
            let numbers = members.iter().filter_map(|&i| records[i].number(INSTANCE_NUMBER));
            let (instance_min, instance_max) = numbers.fold((None, None), |(lo, hi), n| {
                (
                    Some(lo.map_or(n, |lo: f64| lo.min(n))),
                    Some(hi.map_or(n, |hi: f64| hi.max(n))),
                )
            });
            SeriesGroup {
                key,
                n_records: members.len(),
                n_instances,
                instance_min,
                instance_max,
            }
        })
        .collect()
}

/// Series table: key columns, instance count and ordering range.
pub fn series_table(groups: &[SeriesGroup], keys: &[&str]) -> Table {
    let mut columns: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    columns.extend(["n_instances", "instance_min", "instance_max"].map(String::from));
    let mut table = Table::new(columns);
    for group in groups {
        let mut row: Vec<String> = group.key.iter().map(|v| v.clone().unwrap_or_default()).collect();
        row.push(group.n_instances.to_string());
        row.push(format_number(group.instance_min));
        row.push(format_number(group.instance_max));
        table.push_row(row);
    }
    table
}

fn format_number(value: Option<f64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

/// Lazy sequence of `(key, subset)` pairs. Group membership is computed up
/// front, subsets are materialized as the iterator advances.
pub struct Partitions<'a> {
    records: &'a [&'a InstanceRecord],
    groups: std::vec::IntoIter<(GroupKey, Vec<usize>)>,
}

impl<'a> Iterator for Partitions<'a> {
    type Item = (GroupKey, Vec<&'a InstanceRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, members) = self.groups.next()?;
        let subset = members.into_iter().map(|i| self.records[i]).collect();
        Some((key, subset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.groups.size_hint()
    }
}

pub fn partition<'a>(records: &'a [&'a InstanceRecord], keys: &[&str]) -> Partitions<'a> {
    Partitions {
        records,
        groups: group_indices(records, keys).into_iter(),
    }
}

/// CT acquisition parameters per (patient, normalized protocol). Each value
/// column is the sorted set of distinct non-empty values joined by ` | `.
pub fn acquisition_summary(records: &[&InstanceRecord]) -> Table {
    let mut table = Table::new([
        PATIENT_ID,
        PATIENT_NAME,
        PROTOCOL_NORM,
        "n_series",
        "n_instances",
        "kernel",
        "kvp",
        "exposure_time_ms",
        "xray_tube_current_mA",
        "exposure_mAs",
        "pitch",
    ]);

    for (key, subset) in partition(records, &[PATIENT_ID, PROTOCOL_NORM]) {
        let patient_name = subset
            .iter()
            .find_map(|r| r.get_non_empty(PATIENT_NAME))
            .unwrap_or_default()
            .to_string();
        let n_series = subset
            .iter()
            .filter_map(|r| r.get_non_empty(SERIES_UID))
            .collect::<AHashSet<_>>()
            .len();
        let n_instances = subset
            .iter()
            .filter(|r| r.get_non_empty(SOP_INSTANCE_UID).is_some())
            .count();

        let exposure_ms = subset.iter().map(|r| {
            r.number("ExposureTimeInms")
                .or_else(|| r.number("ExposureTime"))
                .map(|n| n.to_string())
        });
        let pitch = subset.iter().map(|r| {
            r.get_non_empty("SpiralPitchFactor")
                .or_else(|| r.get_non_empty("PitchFactor"))
                .map(String::from)
        });

        table.push_row(vec![
            key[0].clone().unwrap_or_default(),
            patient_name,
            key[1].clone().unwrap_or_default(),
            n_series.to_string(),
            n_instances.to_string(),
            unique_join(subset.iter().map(|r| r.get("ConvolutionKernel").map(String::from))),
            unique_join(subset.iter().map(|r| r.get("KVP").map(String::from))),
            unique_join(exposure_ms),
            unique_join(subset.iter().map(|r| r.get("XRayTubeCurrent").map(String::from))),
            unique_join(subset.iter().map(|r| r.get("Exposure").map(String::from))),
            unique_join(pitch),
        ]);
    }
    table
}

fn unique_join(values: impl Iterator<Item = Option<String>>) -> String {
    let set: BTreeSet<String> = values
        .flatten()
        .map(|v| v.trim().to_string())
        .filter(|v| !matches!(v.as_str(), "" | "None" | "nan"))
        .collect();
    set.into_iter().collect::<Vec<_>>().join(" | ")
}
