use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// Delimiter used by header lines and list-valued columns.
pub const COMMA_DELIMITER: &str = ",";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Closed set of feed sources a reconciliation can be run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    Xbox,
    GooglePlay,
    Vudu,
    AmazonInstant,
}

impl FeedType {
    pub const ALL: [FeedType; 4] = [Self::Xbox, Self::GooglePlay, Self::Vudu, Self::AmazonInstant];

    /// Lowercase network label as it appears in studio/network columns.
    pub fn network_label(&self) -> &'static str {
        match self {
            Self::Xbox => "xbox",
            Self::GooglePlay => "google play",
            Self::Vudu => "vudu",
            Self::AmazonInstant => "amazon instant",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xbox => write!(f, "xbox"),
            Self::GooglePlay => write!(f, "google_play"),
            Self::Vudu => write!(f, "vudu"),
            Self::AmazonInstant => write!(f, "amazon_instant"),
        }
    }
}

impl FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.to_string() == normalized)
            .ok_or_else(|| format!("unknown feed type: {s}"))
    }
}

/// Header row plus a lazy sequence of raw text chunks.
///
/// Each chunk may hold one or more newline-delimited rows conforming to
/// the header. Chunks are kept as bytes: text decoding happens per chunk in
/// the parser, so one badly encoded chunk does not end the stream. The
/// sequence is consumed once.
pub struct CsvStream {
    pub header: String,
    rows: Box<dyn Iterator<Item = Vec<u8>> + Send>,
}

impl CsvStream {
    pub fn new<I, S>(header: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send + 'static,
        S: Into<Vec<u8>> + 'static,
    {
        Self {
            header: header.into(),
            rows: Box::new(rows.into_iter().map(Into::into)),
        }
    }

    /// First line is the header; every following line becomes one chunk,
    /// read lazily. Reading stops at the first I/O error.
    pub fn from_reader<R: BufRead + Send + 'static>(mut reader: R) -> Result<Self, ReconError> {
        let mut header = String::new();
        let read = reader
            .read_line(&mut header)
            .map_err(|e| ReconError::Io(format!("cannot read header line: {e}")))?;
        if read == 0 {
            return Err(ReconError::Io("input is empty, expected a header line".into()));
        }

        let rows = reader.split(b'\n').map_while(|line| match line {
            Ok(mut line) => {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Some(line)
            }
            Err(e) => {
                log::warn!("stopped reading rows: {e}");
                None
            }
        });

        Ok(Self::new(header.trim_end_matches(['\r', '\n']), rows))
    }

    /// In-memory variant of [`CsvStream::from_reader`].
    pub fn from_text(text: &str) -> Self {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or_default().to_string();
        let rows: Vec<String> = lines.map(str::to_string).collect();
        Self::new(header, rows)
    }

    pub fn into_rows(self) -> Box<dyn Iterator<Item = Vec<u8>> + Send> {
        self.rows
    }
}

impl fmt::Debug for CsvStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvStream").field("header", &self.header).finish_non_exhaustive()
    }
}

/// The three datasets of one reconciliation.
#[derive(Debug)]
pub struct ReconInput {
    pub feed: CsvStream,
    pub primary: CsvStream,
    pub secondary: CsvStream,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Case-normalized column names of a dataset, in file order.
#[derive(Debug, Clone)]
pub struct Header {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Header {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| normalize_column(c.as_ref()))
            .collect();
        let positions = columns
            .iter()
            .enumerate()
            .rev()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { columns, positions }
    }

    /// Split a header line on the comma delimiter.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
        Self::new(line.split(COMMA_DELIMITER))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Header {}

impl Hash for Header {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.columns.hash(state);
    }
}

/// Lowercase + trim, applied to header names and configured column names.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One canonical row. Equality and hashing cover every column value, so a
/// `HashSet<Record>` drops exact duplicate rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    header: Arc<Header>,
    values: Vec<String>,
}

impl Record {
    /// `values` must line up with `header`; the parser guarantees it.
    pub fn new(header: Arc<Header>, values: Vec<String>) -> Self {
        debug_assert_eq!(header.len(), values.len());
        Self { header, values }
    }

    /// Standalone record with its own header, mostly for tests and callers
    /// building records by hand.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let header = Header::new(pairs.iter().map(|(c, _)| *c));
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Self::new(Arc::new(header), values)
    }

    /// Value of `column`. A column outside the record's schema is a
    /// configuration error, never silently empty.
    pub fn get(&self, column: &str) -> Result<&str, ReconError> {
        self.header
            .position(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
            .ok_or_else(|| ReconError::MissingColumn {
                column: column.to_string(),
                available: self.header.columns().to_vec(),
            })
    }

    /// `get` followed by lowercase + trim.
    pub fn normalized(&self, column: &str) -> Result<String, ReconError> {
        self.get(column).map(normalize_value)
    }
}

/// Default key normalization: lowercase + trim.
pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Parser output for one dataset.
#[derive(Debug, Default)]
pub struct ParsedDataset {
    pub records: HashSet<Record>,
    pub summary: DatasetSummary,
}

// ---------------------------------------------------------------------------
// Identifier mappings
// ---------------------------------------------------------------------------

/// Link between an internal numeric id and an external string id.
///
/// Identity is the external id alone: two mappings with the same external
/// id are the same mapping whatever their internal ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdMapping {
    pub internal_id: i64,
    pub external_id: String,
}

impl IdMapping {
    pub fn new(internal_id: i64, external_id: impl Into<String>) -> Self {
        Self {
            internal_id,
            external_id: external_id.into(),
        }
    }
}

impl PartialEq for IdMapping {
    fn eq(&self, other: &Self) -> bool {
        self.external_id == other.external_id
    }
}

impl Eq for IdMapping {}

impl Hash for IdMapping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.external_id.hash(state);
    }
}

impl Borrow<str> for IdMapping {
    fn borrow(&self) -> &str {
        &self.external_id
    }
}

/// Set of mappings keyed by external id.
///
/// Tracks how many inserts hit an existing external id with a different
/// internal id.
#[derive(Debug, Clone, Default)]
pub struct MappingSet {
    mappings: HashSet<IdMapping>,
    collisions: usize,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the external id is already present. Returns true if inserted.
    pub fn insert_first(&mut self, mapping: IdMapping) -> bool {
        match self.internal_id_of(&mapping.external_id) {
            Some(existing) => {
                if existing != mapping.internal_id {
                    self.record_collision(&mapping.external_id, existing, mapping.internal_id);
                }
                false
            }
            None => self.mappings.insert(mapping),
        }
    }

    /// Insert, keeping the lowest internal id per external id.
    pub fn insert_lowest(&mut self, mapping: IdMapping) {
        match self.internal_id_of(&mapping.external_id) {
            Some(existing) if existing == mapping.internal_id => {}
            Some(existing) => {
                self.record_collision(&mapping.external_id, existing, mapping.internal_id);
                if mapping.internal_id < existing {
                    self.mappings.replace(mapping);
                }
            }
            None => {
                self.mappings.insert(mapping);
            }
        }
    }

    /// Fold `other` in; mappings already present win.
    pub fn union(&mut self, other: MappingSet) {
        for mapping in other.mappings {
            self.insert_first(mapping);
        }
    }

    fn internal_id_of(&self, external_id: &str) -> Option<i64> {
        self.mappings.get(external_id).map(|m| m.internal_id)
    }

    fn record_collision(&mut self, external_id: &str, kept: i64, incoming: i64) {
        log::debug!("external id '{external_id}' maps to internal ids {kept} and {incoming}");
        self.collisions += 1;
    }

    pub fn get(&self, external_id: &str) -> Option<&IdMapping> {
        self.mappings.get(external_id)
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.mappings.contains(external_id)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdMapping> {
        self.mappings.iter()
    }

    /// Mappings ordered by external id.
    pub fn into_sorted_vec(self) -> Vec<IdMapping> {
        let mut out: Vec<IdMapping> = self.mappings.into_iter().collect();
        out.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        out
    }
}

impl FromIterator<IdMapping> for MappingSet {
    fn from_iter<T: IntoIterator<Item = IdMapping>>(iter: T) -> Self {
        let mut set = MappingSet::new();
        for mapping in iter {
            set.insert_lowest(mapping);
        }
        set
    }
}

/// Matcher output for one join.
#[derive(Debug)]
pub struct JoinOutput {
    pub mappings: MappingSet,
    pub summary: JoinSummary,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetSummary {
    pub records: usize,
    pub chunks: usize,
    pub skipped_chunks: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinSummary {
    pub name: String,
    pub driving_records: usize,
    pub candidate_records: usize,
    pub index_keys: usize,
    pub candidates_evaluated: usize,
    pub matched_pairs: usize,
    pub mappings: usize,
    pub collisions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub feed: DatasetSummary,
    pub primary: DatasetSummary,
    pub secondary: DatasetSummary,
    pub joins: Vec<JoinSummary>,
    pub union_collisions: usize,
    pub total_mappings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub feed_type: FeedType,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub mappings: Vec<IdMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_case_normalized() {
        let header = Header::parse("MediaId, Title ,OriginalReleaseDate\r\n");
        assert_eq!(header.columns(), &["mediaid", "title", "originalreleasedate"]);
        assert_eq!(header.position("title"), Some(1));
        assert!(!header.contains("Title"));
    }

    #[test]
    fn records_compare_on_all_values() {
        let a = Record::from_pairs(&[("id", "1"), ("title", "Heat")]);
        let b = Record::from_pairs(&[("id", "1"), ("title", "Heat")]);
        let c = Record::from_pairs(&[("id", "2"), ("title", "Heat")]);
        let set: HashSet<Record> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn record_get_missing_column_is_error() {
        let r = Record::from_pairs(&[("id", "1")]);
        assert_eq!(r.get("id").unwrap(), "1");
        match r.get("title") {
            Err(ReconError::MissingColumn { column, available }) => {
                assert_eq!(column, "title");
                assert_eq!(available, vec!["id".to_string()]);
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn mapping_identity_is_external_id() {
        assert_eq!(IdMapping::new(1, "ext1"), IdMapping::new(2, "ext1"));
        assert_ne!(IdMapping::new(1, "ext1"), IdMapping::new(1, "ext2"));
    }

    #[test]
    fn insert_first_keeps_existing() {
        let mut set = MappingSet::new();
        assert!(set.insert_first(IdMapping::new(7, "ext1")));
        assert!(!set.insert_first(IdMapping::new(3, "ext1")));
        assert!(!set.insert_first(IdMapping::new(7, "ext1")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("ext1").unwrap().internal_id, 7);
        assert_eq!(set.collisions(), 1);
    }

    #[test]
    fn insert_lowest_replaces_higher_internal_id() {
        let set: MappingSet = vec![
            IdMapping::new(9, "ext1"),
            IdMapping::new(4, "ext1"),
            IdMapping::new(6, "ext1"),
            IdMapping::new(1, "ext2"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("ext1").unwrap().internal_id, 4);
        assert_eq!(set.collisions(), 2);
    }

    #[test]
    fn sorted_output_orders_by_external_id() {
        let set: MappingSet = vec![IdMapping::new(1, "b"), IdMapping::new(2, "a")]
            .into_iter()
            .collect();
        let ids: Vec<String> = set.into_sorted_vec().into_iter().map(|m| m.external_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn feed_type_round_trips_through_str() {
        for t in FeedType::ALL {
            assert_eq!(t.to_string().parse::<FeedType>().unwrap(), t);
        }
        assert_eq!("Google Play".parse::<FeedType>().unwrap(), FeedType::GooglePlay);
        assert!("netflix".parse::<FeedType>().is_err());
    }

    #[test]
    fn csv_stream_from_reader_splits_header() {
        let data = "id,title\n1,Heat\n2,Ronin\n";
        let stream = CsvStream::from_reader(std::io::Cursor::new(data)).unwrap();
        assert_eq!(stream.header, "id,title");
        let rows: Vec<Vec<u8>> = stream.into_rows().collect();
        assert_eq!(rows, vec![b"1,Heat".to_vec(), b"2,Ronin".to_vec()]);
    }

    #[test]
    fn csv_stream_from_reader_keeps_lines_after_bad_bytes() {
        let data: &[u8] = b"id,title\r\n1,Heat\r\n2,Bad\xff\r\n3,Alien\n";
        let stream = CsvStream::from_reader(std::io::Cursor::new(data)).unwrap();
        let rows: Vec<Vec<u8>> = stream.into_rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], b"2,Bad\xff".to_vec());
        assert_eq!(rows[2], b"3,Alien".to_vec());
    }

    #[test]
    fn csv_stream_from_empty_reader_fails() {
        let err = CsvStream::from_reader(std::io::Cursor::new("")).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
    }
}
