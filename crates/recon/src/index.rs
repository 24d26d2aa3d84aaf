//! Join-key index over a candidate set.
//!
//! Keys are derived per column: list columns are split and indexed once per
//! element, date columns collapse to their year, everything else is
//! lowercased and trimmed.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;

use crate::config::{BadDatePolicy, JoinConfig, KeyPolicyConfig};
use crate::error::ReconError;
use crate::model::{normalize_value, Record};

// ---------------------------------------------------------------------------
// Key policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    List,
    Date,
    Default,
}

impl KeyPolicyConfig {
    pub fn policy_for(&self, column: &str) -> KeyPolicy {
        if self.list_columns.iter().any(|c| c == column) {
            KeyPolicy::List
        } else if self.date_columns.iter().any(|c| c == column) {
            KeyPolicy::Date
        } else {
            KeyPolicy::Default
        }
    }

    /// Index keys `value` produces under `column`'s policy. Blank keys are dropped.
    pub fn keys_for(&self, column: &str, value: &str) -> Result<Vec<String>, ReconError> {
        let keys = match self.policy_for(column) {
            KeyPolicy::List => value
                .split(self.list_delimiter.as_str())
                .map(normalize_value)
                .filter(|k| !k.is_empty())
                .collect(),
            KeyPolicy::Date => match parse_year(value, &self.date_formats) {
                Some(year) => vec![year.to_string()],
                None => match self.on_bad_date {
                    BadDatePolicy::Fail => {
                        return Err(ReconError::DateParse {
                            column: column.to_string(),
                            value: value.to_string(),
                        })
                    }
                    BadDatePolicy::Skip => {
                        log::warn!("column '{column}': skipping unparsable date '{value}'");
                        Vec::new()
                    }
                },
            },
            KeyPolicy::Default => {
                let key = normalize_value(value);
                if key.is_empty() {
                    Vec::new()
                } else {
                    vec![key]
                }
            }
        };
        Ok(keys)
    }
}

/// Year of the token before the first space, under the first format that accepts it.
pub fn parse_year(value: &str, formats: &[String]) -> Option<i32> {
    let token = value.trim().split(' ').next().unwrap_or_default();
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
        .map(|date| date.year())
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Normalized key → positions of the records that produced it.
///
/// Not unique in either direction: a key may hold many records and a record
/// with a list column may sit under many keys.
#[derive(Debug, Default)]
pub struct JoinIndex {
    buckets: HashMap<String, Vec<usize>>,
}

impl JoinIndex {
    /// Build over `records`, keyed by `columns`.
    ///
    /// Workers fold into private bucket maps which are then merged, so no
    /// bucket ever has two writers.
    pub fn build(
        records: &[Record],
        columns: &[&str],
        keys: &KeyPolicyConfig,
    ) -> Result<Self, ReconError> {
        let mut buckets = records
            .par_iter()
            .enumerate()
            .try_fold(HashMap::new, |mut map: HashMap<String, Vec<usize>>, (pos, record)| {
                for column in columns {
                    for key in keys.keys_for(column, record.get(column)?)? {
                        map.entry(key).or_default().push(pos);
                    }
                }
                Ok::<_, ReconError>(map)
            })
            .try_reduce(HashMap::new, |mut left, right| {
                for (key, mut positions) in right {
                    left.entry(key).or_default().append(&mut positions);
                }
                Ok(left)
            })?;

        for positions in buckets.values_mut() {
            positions.sort_unstable();
            positions.dedup();
        }

        Ok(Self { buckets })
    }

    pub fn lookup(&self, key: &str) -> &[usize] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Candidate records plus their index for one join configuration.
/// Read-only once built.
#[derive(Debug)]
pub struct CandidateSet {
    records: Vec<Record>,
    index: JoinIndex,
}

impl CandidateSet {
    pub fn build<I>(records: I, join: &JoinConfig, keys: &KeyPolicyConfig) -> Result<Self, ReconError>
    where
        I: IntoIterator<Item = Record>,
    {
        let records: Vec<Record> = records.into_iter().collect();
        let columns = join.candidate_columns();
        log::info!("building lookup index over {} records for columns {:?}", records.len(), columns);
        let index = JoinIndex::build(&records, &columns, keys)?;
        log::info!("lookup index ready: {} keys", index.len());
        Ok(Self { records, index })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn index(&self) -> &JoinIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
