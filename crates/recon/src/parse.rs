//! Raw delimited text → deduplicated canonical records.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ReconError;
use crate::model::{CsvStream, DatasetSummary, Header, ParsedDataset, Record};

/// Parsed rows are merged into the result set in batches of this size.
pub const BATCH_SIZE: usize = 1000;

/// Parse a header line plus its chunks.
pub fn parse_stream(stream: CsvStream) -> ParsedDataset {
    let header = Arc::new(Header::parse(&stream.header));
    parse_records(header, stream.into_rows())
}

/// Parse every chunk against `header` and collect unique records.
///
/// A chunk that does not parse is logged and skipped as a whole; the
/// remaining chunks are still read.
pub fn parse_records<I, S>(header: Arc<Header>, chunks: I) -> ParsedDataset
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut records: HashSet<Record> = HashSet::new();
    let mut batch: Vec<Record> = Vec::with_capacity(BATCH_SIZE);
    let mut summary = DatasetSummary::default();

    for (chunk_idx, chunk) in chunks.into_iter().enumerate() {
        summary.chunks += 1;
        match parse_chunk(&header, chunk_idx, chunk.as_ref()) {
            Ok(rows) => {
                for row in rows {
                    batch.push(row);
                    if batch.len() >= BATCH_SIZE {
                        records.extend(batch.drain(..));
                    }
                }
            }
            Err(e) => {
                log::warn!("skipping {e}");
                summary.skipped_chunks += 1;
            }
        }
    }
    records.extend(batch);

    summary.records = records.len();
    log::info!(
        "parsed {} unique records from {} chunks ({} skipped)",
        summary.records,
        summary.chunks,
        summary.skipped_chunks
    );

    ParsedDataset { records, summary }
}

/// Parse one chunk. All rows of the chunk must be valid UTF-8, correctly
/// quoted, and have exactly one field per header column, otherwise the
/// whole chunk is rejected.
pub fn parse_chunk(header: &Arc<Header>, chunk_idx: usize, text: &[u8]) -> Result<Vec<Record>, ReconError> {
    let row_err = |reason: String| ReconError::RowParse { chunk: chunk_idx, reason };

    check_quoting(text).map_err(row_err)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text);

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| row_err(e.to_string()))?;

        if record.len() != header.len() {
            return Err(row_err(format!(
                "row {}: expected {} fields, found {}",
                row_idx + 1,
                header.len(),
                record.len()
            )));
        }

        let values = record.iter().map(str::to_string).collect();
        rows.push(Record::new(Arc::clone(header), values));
    }

    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    /// A quote seen inside a quoted field: either the closing quote or the
    /// first half of an escaped `""`.
    QuoteInQuoted,
    /// `\r` right after a closing quote.
    ClosedCr,
}

/// Reject quoted fields that are never closed or that carry text after
/// the closing quote. A quote inside an unquoted field is literal.
fn check_quoting(text: &[u8]) -> Result<(), String> {
    use QuoteState::*;

    let mut line = 1;
    let mut state = FieldStart;
    for &byte in text {
        state = match (state, byte) {
            (FieldStart, b'"') => Quoted,
            (FieldStart | Unquoted, b',') => FieldStart,
            (FieldStart | Unquoted, b'\n') => {
                line += 1;
                FieldStart
            }
            (FieldStart | Unquoted, _) => Unquoted,
            (Quoted, b'"') => QuoteInQuoted,
            (Quoted, b) => {
                if b == b'\n' {
                    line += 1;
                }
                Quoted
            }
            (QuoteInQuoted, b'"') => Quoted,
            (QuoteInQuoted, b',') => FieldStart,
            (QuoteInQuoted, b'\r') => ClosedCr,
            (QuoteInQuoted | ClosedCr, b'\n') => {
                line += 1;
                FieldStart
            }
            (QuoteInQuoted | ClosedCr, b) => {
                return Err(format!(
                    "line {line}: unexpected {:?} after closing quote",
                    char::from(b)
                ));
            }
        };
    }

    if state == Quoted {
        return Err(format!("line {line}: unterminated quoted field"));
    }
    Ok(())
}
