use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::index::CandidateSet;
use crate::matcher::match_records;
use crate::model::{CsvStream, DatasetSummary, FeedType, ReconInput, ReconMeta, ReconResult, ReconSummary};
use crate::parse::parse_stream;

/// Reference datasets parsed and indexed once, ready to reconcile any
/// number of feeds.
///
/// Nothing here is mutated after construction, so one `Reconciler` can be
/// shared across threads.
#[derive(Debug)]
pub struct Reconciler {
    config: ReconConfig,
    primary: CandidateSet,
    secondary: CandidateSet,
    primary_summary: DatasetSummary,
    secondary_summary: DatasetSummary,
}

impl Reconciler {
    pub fn new(config: ReconConfig, primary: CsvStream, secondary: CsvStream) -> Result<Self, ReconError> {
        config.validate()?;

        let primary_parsed = parse_stream(primary);
        let secondary_parsed = parse_stream(secondary);

        let (primary_set, secondary_set) = rayon::join(
            || CandidateSet::build(primary_parsed.records, &config.primary, &config.keys),
            || CandidateSet::build(secondary_parsed.records, &config.secondary, &config.keys),
        );

        Ok(Self {
            primary: primary_set?,
            secondary: secondary_set?,
            primary_summary: primary_parsed.summary,
            secondary_summary: secondary_parsed.summary,
            config,
        })
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// Match `feed` against both reference datasets and union the results.
    ///
    /// Where both joins map the same external id, the primary join's
    /// mapping is kept.
    pub fn reconcile(&self, feed_type: FeedType, feed: CsvStream) -> Result<ReconResult, ReconError> {
        log::info!("reconciling {feed_type} feed with '{}'", self.config.name);
        let feed = parse_stream(feed);

        let (primary, secondary) = rayon::join(
            || match_records("primary", &feed.records, &self.primary, &self.config.primary, feed_type),
            || match_records("secondary", &feed.records, &self.secondary, &self.config.secondary, feed_type),
        );
        let primary = primary?;
        let secondary = secondary?;

        let mut mappings = primary.mappings;
        let before = mappings.collisions();
        mappings.union(secondary.mappings);
        let union_collisions = mappings.collisions() - before;

        let summary = ReconSummary {
            feed: feed.summary,
            primary: self.primary_summary.clone(),
            secondary: self.secondary_summary.clone(),
            joins: vec![primary.summary, secondary.summary],
            union_collisions,
            total_mappings: mappings.len(),
        };

        log::info!(
            "{} mappings ({} from primary, {} from secondary, {} conflicting)",
            summary.total_mappings,
            summary.joins[0].mappings,
            summary.joins[1].mappings,
            union_collisions
        );

        Ok(ReconResult {
            meta: ReconMeta {
                config_name: self.config.name.clone(),
                feed_type,
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary,
            mappings: mappings.into_sorted_vec(),
        })
    }
}

/// Reconcile one feed against freshly parsed reference datasets.
pub fn run(config: &ReconConfig, feed_type: FeedType, input: ReconInput) -> Result<ReconResult, ReconError> {
    let reconciler = Reconciler::new(config.clone(), input.primary, input.secondary)?;
    reconciler.reconcile(feed_type, input.feed)
}
