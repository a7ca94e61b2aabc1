use crate::record::{parse_position_depth, InstanceRecord, ACQUISITION_TIME, IMAGE_POSITION, INSTANCE_NUMBER};
use std::cmp::Ordering;

/// Sort key produced by an ordering strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
        }
    }
}

/// Ways of ordering the slices of a series, tried in `CHAIN` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingStrategy {
    InstanceNumber,
    SlicePosition,
    AcquisitionTime,
    SourcePath,
}

impl OrderingStrategy {
    pub const CHAIN: [OrderingStrategy; 4] = [
        OrderingStrategy::InstanceNumber,
        OrderingStrategy::SlicePosition,
        OrderingStrategy::AcquisitionTime,
        OrderingStrategy::SourcePath,
    ];

    pub fn key(&self, record: &InstanceRecord) -> Option<SortKey> {
        match self {
            OrderingStrategy::InstanceNumber => record.number(INSTANCE_NUMBER).map(SortKey::Number),
            OrderingStrategy::SlicePosition => record
                .get(IMAGE_POSITION)
                .and_then(parse_position_depth)
                .map(SortKey::Number),
            OrderingStrategy::AcquisitionTime => record
                .get_non_empty(ACQUISITION_TIME)
                .map(|t| SortKey::Text(t.trim().to_string())),
            OrderingStrategy::SourcePath => Some(SortKey::Text(record.path_str())),
        }
    }
}

/// First strategy in the chain that yields a key for at least one record.
/// `SourcePath` always does, so an empty group also resolves to it.
pub fn select_strategy(records: &[&InstanceRecord]) -> OrderingStrategy {
    OrderingStrategy::CHAIN
        .into_iter()
        .find(|strategy| records.iter().any(|r| strategy.key(r).is_some()))
        .unwrap_or(OrderingStrategy::SourcePath)
}

/// Sorts a group by its selected strategy. Records without a key sort
/// first; ties and missing keys fall back to source path order.
pub fn sort_group<'a>(records: &[&'a InstanceRecord]) -> (OrderingStrategy, Vec<&'a InstanceRecord>) {
    let strategy = select_strategy(records);
    let mut keyed: Vec<(Option<SortKey>, &'a InstanceRecord)> =
        records.iter().map(|r| (strategy.key(r), *r)).collect();

    keyed.sort_by(|(ka, ra), (kb, rb)| {
        let by_key = match (ka, kb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.compare(b),
        };
        by_key.then_with(|| ra.path.cmp(&rb.path))
    });

    (strategy, keyed.into_iter().map(|(_, r)| r).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;

    fn paths(sorted: &[&InstanceRecord]) -> Vec<String> {
        sorted.iter().map(|r| r.path_str()).collect()
    }

    #[test]
    fn test_instance_number_is_numeric_not_lexicographic() {
        let a = record("/a", &[("InstanceNumber", "10")]);
        let b = record("/b", &[("InstanceNumber", "9")]);
        let c = record("/c", &[("InstanceNumber", "1")]);
        let (strategy, sorted) = sort_group(&[&a, &b, &c]);
        assert_eq!(strategy, OrderingStrategy::InstanceNumber);
        assert_eq!(paths(&sorted), vec!["/c", "/b", "/a"]);
    }

    #[test]
    fn test_missing_keys_sort_first_then_path() {
        let a = record("/z", &[("InstanceNumber", "2")]);
        let b = record("/y", &[]);
        let c = record("/x", &[("InstanceNumber", "garbage")]);
        let d = record("/w", &[("InstanceNumber", "2")]);
        let (_, sorted) = sort_group(&[&a, &b, &c, &d]);
        assert_eq!(paths(&sorted), vec!["/x", "/y", "/w", "/z"]);
    }

    #[test]
    fn test_falls_back_to_slice_depth() {
        let a = record("/a", &[("ImagePositionPatient", "0\\0\\15.5")]);
        let b = record("/b", &[("ImagePositionPatient", "[0, 0, -3]")]);
        let c = record("/c", &[("ImagePositionPatient", "0,0,7")]);
        for order in [[&a, &b, &c], [&c, &a, &b], [&b, &c, &a]] {
            let (strategy, sorted) = sort_group(&order);
            assert_eq!(strategy, OrderingStrategy::SlicePosition);
            assert_eq!(paths(&sorted), vec!["/b", "/c", "/a"]);
        }
    }

    #[test]
    fn test_unparseable_positions_fall_through_to_time() {
        let a = record("/a", &[("ImagePositionPatient", "bogus"), ("AcquisitionTime", "101500")]);
        let b = record("/b", &[("ImagePositionPatient", "1\\2"), ("AcquisitionTime", "101400")]);
        let (strategy, sorted) = sort_group(&[&a, &b]);
        assert_eq!(strategy, OrderingStrategy::AcquisitionTime);
        assert_eq!(paths(&sorted), vec!["/b", "/a"]);
    }

    #[test]
    fn test_path_is_terminal_strategy() {
        let a = record("/b/2", &[]);
        let b = record("/a/9", &[]);
        let (strategy, sorted) = sort_group(&[&a, &b]);
        assert_eq!(strategy, OrderingStrategy::SourcePath);
        assert_eq!(paths(&sorted), vec!["/a/9", "/b/2"]);
        assert_eq!(select_strategy(&[]), OrderingStrategy::SourcePath);
    }
}
