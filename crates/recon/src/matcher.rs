use std::collections::HashSet;

use rayon::prelude::*;

use crate::config::{JoinConfig, KeyPolicyConfig};
use crate::error::ReconError;
use crate::index::CandidateSet;
use crate::model::{normalize_value, FeedType, IdMapping, JoinOutput, JoinSummary, MappingSet, Record};

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// Containment test built from one driving record.
///
/// A candidate passes when, for any configured (driving, candidate) column
/// pair, the candidate's normalized value contains the driving record's
/// normalized value.
#[derive(Debug)]
pub struct MatchPredicate<'a> {
    clauses: Vec<(&'a str, String)>,
    feed_filter: Option<(&'a str, &'static str)>,
}

impl<'a> MatchPredicate<'a> {
    pub fn build(join: &'a JoinConfig, driving: &Record, feed_type: FeedType) -> Result<Self, ReconError> {
        let mut clauses = Vec::new();
        for (driving_col, candidate_col) in join.column_pairs() {
            let needle = driving.normalized(driving_col)?;
            // A blank value is a substring of everything.
            if !needle.is_empty() {
                clauses.push((candidate_col, needle));
            }
        }

        let feed_filter = join
            .feed_column
            .as_deref()
            .map(|column| (column, feed_type.network_label()));

        Ok(Self { clauses, feed_filter })
    }

    /// True when no clause can ever pass.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, candidate: &Record) -> Result<bool, ReconError> {
        if let Some((column, label)) = self.feed_filter {
            if !candidate.normalized(column)?.contains(label) {
                return Ok(false);
            }
        }
        for (column, needle) in &self.clauses {
            if normalize_value(candidate.get(column)?).contains(needle.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub fn parse_internal_id(column: &str, value: &str) -> Result<i64, ReconError> {
    value.trim().parse().map_err(|_| ReconError::IdParse {
        column: column.to_string(),
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Per-worker accumulator, merged after the parallel pass.
#[derive(Debug, Default)]
struct Tally {
    mappings: Vec<IdMapping>,
    candidates_evaluated: usize,
    matched_pairs: usize,
}

impl Tally {
    fn merge(mut self, mut other: Tally) -> Tally {
        self.mappings.append(&mut other.mappings);
        self.candidates_evaluated += other.candidates_evaluated;
        self.matched_pairs += other.matched_pairs;
        self
    }
}

/// Match one driving record against the candidates sharing one of its keys.
fn match_one(
    tally: &mut Tally,
    driving: &Record,
    candidates: &CandidateSet,
    join: &JoinConfig,
    feed_type: FeedType,
) -> Result<(), ReconError> {
    let external_id = driving.get(&join.result.external)?;
    let predicate = MatchPredicate::build(join, driving, feed_type)?;
    if predicate.is_empty() {
        return Ok(());
    }

    // Exact-key lookups narrow the search; the predicate then decides.
    let mut positions: Vec<usize> = Vec::new();
    for column in join.driving_columns() {
        let key = driving.normalized(column)?;
        if !key.is_empty() {
            positions.extend_from_slice(candidates.index().lookup(&key));
        }
    }
    positions.sort_unstable();
    positions.dedup();

    for pos in positions {
        let candidate = &candidates.records()[pos];
        tally.candidates_evaluated += 1;
        if predicate.matches(candidate)? {
            let internal_id = parse_internal_id(
                &join.result.internal,
                candidate.get(&join.result.internal)?,
            )?;
            tally.matched_pairs += 1;
            tally.mappings.push(IdMapping::new(internal_id, external_id));
        }
    }

    Ok(())
}

/// Run one join: every driving record against the indexed candidate set.
///
/// Driving records are processed in parallel. The index is only read.
/// When several candidates yield the same external id the lowest internal
/// id is kept.
pub fn match_records(
    name: &str,
    driving: &HashSet<Record>,
    candidates: &CandidateSet,
    join: &JoinConfig,
    feed_type: FeedType,
) -> Result<JoinOutput, ReconError> {
    log::info!(
        "{name}: matching {} records against {} candidates on {:?}",
        driving.len(),
        candidates.len(),
        join.columns
    );

    let tally = driving
        .par_iter()
        .try_fold(Tally::default, |mut tally, record| {
            match_one(&mut tally, record, candidates, join, feed_type)?;
            Ok::<_, ReconError>(tally)
        })
        .try_reduce(Tally::default, |a, b| Ok(a.merge(b)))?;

    // Sorted so collision counts do not depend on how work was split.
    let mut pairs = tally.mappings;
    pairs.sort_unstable_by(|a, b| {
        a.external_id
            .cmp(&b.external_id)
            .then(a.internal_id.cmp(&b.internal_id))
    });
    pairs.dedup_by(|a, b| a.external_id == b.external_id && a.internal_id == b.internal_id);
    let mappings: MappingSet = pairs.into_iter().collect();
    let summary = JoinSummary {
        name: name.to_string(),
        driving_records: driving.len(),
        candidate_records: candidates.len(),
        index_keys: candidates.index().len(),
        candidates_evaluated: tally.candidates_evaluated,
        matched_pairs: tally.matched_pairs,
        mappings: mappings.len(),
        collisions: mappings.collisions(),
    };

    log::info!(
        "{name}: {} candidates evaluated, {} matched pairs, {} mappings",
        summary.candidates_evaluated,
        summary.matched_pairs,
        summary.mappings
    );

    Ok(JoinOutput { mappings, summary })
}

/// Index `candidates` for `join`, then match `driving` against them.
pub fn fuzzy_join(
    name: &str,
    driving: &HashSet<Record>,
    candidates: HashSet<Record>,
    join: &JoinConfig,
    keys: &KeyPolicyConfig,
    feed_type: FeedType,
) -> Result<JoinOutput, ReconError> {
    let candidates = CandidateSet::build(candidates, join, keys)?;
    match_records(name, driving, &candidates, join, feed_type)
}
