use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{normalize_column, COMMA_DELIMITER};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Two join configurations run against the same feed, plus the key
/// normalization policies shared by both index builds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub keys: KeyPolicyConfig,
    /// Join 1: feed (driving) against the primary entity table.
    pub primary: JoinConfig,
    /// Join 2: feed (driving) against the secondary entity table.
    pub secondary: JoinConfig,
}

fn default_name() -> String {
    "recon".into()
}

impl Default for ReconConfig {
    /// Movie catalog: titles against the title table, people names against
    /// the cast/crew table.
    fn default() -> Self {
        Self {
            name: "movie catalog".into(),
            keys: KeyPolicyConfig {
                list_columns: vec!["actors".into()],
                date_columns: vec!["originalreleasedate".into()],
                ..KeyPolicyConfig::default()
            },
            primary: JoinConfig {
                feed_column: None,
                columns: BTreeMap::from([("title".into(), vec!["title".into()])]),
                result: ResultColumns {
                    internal: "mediaid".into(),
                    external: "id".into(),
                },
            },
            secondary: JoinConfig {
                feed_column: None,
                columns: BTreeMap::from([(
                    "name".into(),
                    vec!["actors".into(), "director".into()],
                )]),
                result: ResultColumns {
                    internal: "movie_id".into(),
                    external: "id".into(),
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Column correspondence for one join.
///
/// `columns` maps a driving-set column to the candidate-set columns that may
/// match it (OR across the list and across entries).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JoinConfig {
    /// Candidate column that must also mention the feed's network label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_column: Option<String>,
    pub columns: BTreeMap<String, Vec<String>>,
    pub result: ResultColumns,
}

/// Which column of each matched side supplies the output id pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResultColumns {
    /// Candidate-side column, parsed as an integer.
    pub internal: String,
    /// Driving-side column, taken verbatim.
    pub external: String,
}

impl JoinConfig {
    /// Every (driving column, candidate column) pair in config order.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .flat_map(|(a, bs)| bs.iter().map(move |b| (a.as_str(), b.as_str())))
    }

    /// Candidate columns the index is keyed on, deduplicated.
    pub fn candidate_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (_, b) in self.column_pairs() {
            if !out.contains(&b) {
                out.push(b);
            }
        }
        out
    }

    pub fn driving_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    fn normalize(&mut self) {
        self.columns = std::mem::take(&mut self.columns)
            .into_iter()
            .map(|(a, bs)| {
                let bs = bs.iter().map(|b| normalize_column(b)).collect();
                (normalize_column(&a), bs)
            })
            .collect();
        self.result.internal = normalize_column(&self.result.internal);
        self.result.external = normalize_column(&self.result.external);
        self.feed_column = self.feed_column.as_deref().map(normalize_column);
    }

    fn validate(&self, join: &str) -> Result<(), ReconError> {
        if self.columns.is_empty() {
            return Err(ReconError::ConfigValidation(format!(
                "{join}: at least one column mapping is required"
            )));
        }
        for (a, bs) in &self.columns {
            if a.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "{join}: blank driving column name"
                )));
            }
            if bs.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "{join}: column '{a}' maps to no candidate columns"
                )));
            }
            if bs.iter().any(String::is_empty) {
                return Err(ReconError::ConfigValidation(format!(
                    "{join}: column '{a}' lists a blank candidate column"
                )));
            }
        }
        if self.result.internal.is_empty() || self.result.external.is_empty() {
            return Err(ReconError::ConfigValidation(format!(
                "{join}: result columns must both be set"
            )));
        }
        if matches!(self.feed_column.as_deref(), Some("")) {
            return Err(ReconError::ConfigValidation(format!(
                "{join}: feed_column is blank"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Key policies
// ---------------------------------------------------------------------------

/// Per-column normalization used when building the join-key index.
/// Columns not listed here use lowercase + trim.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeyPolicyConfig {
    /// Multi-valued columns, indexed once per element.
    #[serde(default)]
    pub list_columns: Vec<String>,
    #[serde(default = "default_list_delimiter")]
    pub list_delimiter: String,
    /// Date columns, indexed by year.
    #[serde(default)]
    pub date_columns: Vec<String>,
    /// chrono format strings, tried in order.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub on_bad_date: BadDatePolicy,
}

impl Default for KeyPolicyConfig {
    fn default() -> Self {
        Self {
            list_columns: Vec::new(),
            list_delimiter: default_list_delimiter(),
            date_columns: Vec::new(),
            date_formats: default_date_formats(),
            on_bad_date: BadDatePolicy::default(),
        }
    }
}

fn default_list_delimiter() -> String {
    COMMA_DELIMITER.into()
}

fn default_date_formats() -> Vec<String> {
    vec!["%m/%d/%Y".into(), "%m-%d-%Y".into(), "%Y-%m-%d".into()]
}

/// What the index builder does with a date value no format accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadDatePolicy {
    /// Abort the reconciliation.
    #[default]
    Fail,
    /// Leave the record out of that column's keys and keep going.
    Skip,
}

impl KeyPolicyConfig {
    fn normalize(&mut self) {
        self.list_columns = self.list_columns.iter().map(|c| normalize_column(c)).collect();
        self.date_columns = self.date_columns.iter().map(|c| normalize_column(c)).collect();
    }

    fn validate(&self) -> Result<(), ReconError> {
        if self.list_delimiter.is_empty() {
            return Err(ReconError::ConfigValidation("keys: list_delimiter is empty".into()));
        }
        if !self.date_columns.is_empty() && self.date_formats.is_empty() {
            return Err(ReconError::ConfigValidation(
                "keys: date_columns set but date_formats is empty".into(),
            ));
        }
        if let Some(c) = self.list_columns.iter().find(|c| self.date_columns.contains(c)) {
            return Err(ReconError::ConfigValidation(format!(
                "keys: column '{c}' is both a list and a date column"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let mut config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    /// Lowercase + trim every column name so it lines up with parsed headers.
    pub fn normalize(&mut self) {
        self.keys.normalize();
        self.primary.normalize();
        self.secondary.normalize();
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        self.keys.validate()?;
        self.primary.validate("primary")?;
        self.secondary.validate("secondary")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
