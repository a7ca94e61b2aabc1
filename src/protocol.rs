use crate::error::Error;
use crate::record::{InstanceRecord, NOT_AVAILABLE, PROTOCOL_NAME, SERIES_DESCRIPTION};
use ahash::AHashMap;
use config::{Config, File, FileFormat};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// On-disk shape of the rules file.
///
/// ```toml
/// [protocol_map]
/// "TORAX AP" = "CHEST"
///
/// [[protocol_regex]]
/// pattern = "^abd.*"
/// replace = "ABDOMEN"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RulesFile {
    pub protocol_map: HashMap<String, String>,
    pub protocol_regex: Vec<RawRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRule {
    pub pattern: Option<String>,
    pub replace: String,
}

#[derive(Debug, Clone)]
pub struct RegexRule {
    pattern: Regex,
    replacement: String,
}

impl RegexRule {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Exact-match table plus ordered regex rules. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRuleSet {
    exact: AHashMap<String, String>,
    rules: Vec<RegexRule>,
}

impl ProtocolRuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a rule set. Patterns that fail to compile are dropped with a
    /// warning, which makes them behave as never matching.
    pub fn from_rules<I, J>(exact: I, rules: J) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
        J: IntoIterator<Item = (String, String)>,
    {
        let rules = rules
            .into_iter()
            .filter(|(pattern, _)| !pattern.is_empty())
            .filter_map(|(pattern, replace)| {
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(RegexRule {
                        pattern: regex,
                        replacement: translate_replacement(&replace),
                    }),
                    Err(e) => {
                        warn!("Ignoring protocol rule '{}': {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            exact: exact.into_iter().collect(),
            rules,
        }
    }

    pub fn from_file(file: RulesFile) -> Self {
        Self::from_rules(
            file.protocol_map,
            file.protocol_regex
                .into_iter()
                .filter_map(|r| r.pattern.map(|p| (p, r.replace))),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.rules.is_empty()
    }

    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }
}

/// Loads a rules file, TOML or YAML by extension. A missing, unreadable or
/// invalid file degrades to the empty rule set.
pub fn load_rules(path: Option<&Path>) -> ProtocolRuleSet {
    let Some(path) = path else {
        return ProtocolRuleSet::empty();
    };
    match read_rules_file(path) {
        Ok(file) => {
            let rules = ProtocolRuleSet::from_file(file);
            debug!(
                "Loaded {} exact and {} regex protocol rules from {}",
                rules.exact.len(),
                rules.rules.len(),
                path.display()
            );
            rules
        }
        Err(e) => {
            warn!("Protocol rules not loaded from {}: {}", path.display(), e);
            ProtocolRuleSet::empty()
        }
    }
}

fn read_rules_file(path: &Path) -> Result<RulesFile, Error> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if is_yaml {
        let file = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        return Ok(file);
    }
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

/// Maps a raw protocol label to its canonical label.
///
/// Absent or blank labels yield `NA`. An exact match wins, then the first
/// regex rule that matches anywhere in the label (case-insensitive) has its
/// replacement substituted over the matches. Otherwise the trimmed label
/// passes through.
pub fn normalize(label: Option<&str>, rules: &ProtocolRuleSet) -> String {
    let label = match label.map(str::trim) {
        None | Some("") => return NOT_AVAILABLE.to_string(),
        Some(s) => s,
    };

    if let Some(canonical) = rules.exact.get(label) {
        return canonical.clone();
    }

    rules
        .rules
        .iter()
        .find(|rule| rule.pattern.is_match(label))
        .map(|rule| {
            rule.pattern
                .replace_all(label, rule.replacement.as_str())
                .into_owned()
        })
        .unwrap_or_else(|| label.to_string())
}

/// Protocol label used for grouping: ProtocolName, else SeriesDescription,
/// else `NA`.
pub fn effective_label(record: &InstanceRecord) -> String {
    record
        .get_non_empty(PROTOCOL_NAME)
        .or_else(|| record.get_non_empty(SERIES_DESCRIPTION))
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

/// Attaches the effective and normalized protocol labels to every record.
pub fn enrich(records: Vec<InstanceRecord>, rules: &ProtocolRuleSet) -> Vec<InstanceRecord> {
    records
        .into_iter()
        .map(|mut record| {
            let effective = effective_label(&record);
            record.protocol_norm = Some(normalize(Some(&effective), rules));
            record.protocol_effective = Some(effective);
            record
        })
        .collect()
}

/// Rewrites `\1` and `\g<name>` back-references into `${1}` / `${name}`.
/// Templates already written with `$` references are left alone.
fn translate_replacement(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    group.push(*d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", group));
            }
            Some(&'g') => {
                chars.next();
                if chars.peek() == Some(&'<') {
                    chars.next();
                    let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                    out.push_str(&format!("${{{}}}", name));
                } else {
                    out.push_str("\\g");
                }
            }
            Some(&'\\') => {
                chars.next();
                out.push('\\');
            }
            _ => out.push('\\'),
        }
    }
    out
}
