use crate::config::{parse_date_range, parse_study_date, FilterConfig};
use crate::error::Error;
use crate::record::{InstanceRecord, MODALITY, PATIENT_ID, PROTOCOL_NORM, STUDY_DATE};
use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};

/// Compiled record selection. Every predicate tests one attribute; a record
/// without that attribute passes the predicate.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    modalities: Vec<String>,
    date_range: Option<(NaiveDate, NaiveDate)>,
    patient_ids: Vec<String>,
    protocol_include: Option<Regex>,
    protocol_exclude: Option<Regex>,
}

impl RecordFilter {
    pub fn from_config(config: &FilterConfig) -> Result<Self, Error> {
        let date_range = match config.date_range.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(range) => Some(parse_date_range(range)?),
        };
        Ok(Self {
            modalities: config.modalities.clone(),
            date_range,
            patient_ids: config.patient_ids.clone(),
            protocol_include: compile(config.protocol_include.as_deref())?,
            protocol_exclude: compile(config.protocol_exclude.as_deref())?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.modalities.is_empty()
            && self.date_range.is_none()
            && self.patient_ids.is_empty()
            && self.protocol_include.is_none()
            && self.protocol_exclude.is_none()
    }

    pub fn matches(&self, record: &InstanceRecord) -> bool {
        if !self.modalities.is_empty() {
            if let Some(modality) = record.get(MODALITY) {
                if !self.modalities.iter().any(|m| m == modality) {
                    return false;
                }
            }
        }
        if let Some((start, end)) = self.date_range {
            if let Some(date) = record.get(STUDY_DATE).and_then(parse_study_date) {
                if date < start || date > end {
                    return false;
                }
            }
        }
        if !self.patient_ids.is_empty() {
            if let Some(patient) = record.get(PATIENT_ID) {
                if !self.patient_ids.iter().any(|p| p == patient) {
                    return false;
                }
            }
        }
        if let Some(protocol) = record.get(PROTOCOL_NORM) {
            if let Some(include) = &self.protocol_include {
                if !include.is_match(protocol) {
                    return false;
                }
            }
            if let Some(exclude) = &self.protocol_exclude {
                if exclude.is_match(protocol) {
                    return false;
                }
            }
        }
        true
    }

    pub fn apply<'a>(&self, records: &'a [InstanceRecord]) -> Vec<&'a InstanceRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, Error> {
    let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}
