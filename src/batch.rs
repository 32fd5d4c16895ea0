// Query batching.
//
// Reads 4-line query records from a text stream and packs them into a
// fixed-budget buffer slot: payload bytes concatenated back to back, with
// parallel per-query length and identifier sequences. Two slots exist; the
// pipeline rotates them while dispatches are in flight.

use crate::errors::{Result, SearchError};
use std::io::{self, BufRead};

/// One reusable buffer slot.
///
/// A slot is in exactly one of three states at any instant: being filled,
/// dispatched/in-flight, or being decoded. The pipeline enforces this by
/// ownership: dispatch consumes the slot and wait returns it.
#[derive(Debug)]
pub struct SlotBuffers {
    pub ids: Vec<String>,
    /// Packed concatenation of query payloads, capped by the byte budget.
    pub queries: Vec<u8>,
    /// Per-query payload lengths, parallel to `ids`.
    pub sizes: Vec<u64>,
    /// Per-query result chunks, sized by the backend at dispatch.
    pub results: Vec<u64>,
}

impl SlotBuffers {
    pub fn with_budget(budget: usize) -> Self {
        Self {
            ids: Vec::new(),
            queries: Vec::with_capacity(budget),
            sizes: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn query_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Reset for refilling, keeping allocations.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.queries.clear();
        self.sizes.clear();
        self.results.clear();
    }

    fn push(&mut self, record: QueryRecord) {
        self.sizes.push(record.seq.len() as u64);
        self.queries.extend_from_slice(&record.seq);
        self.ids.push(record.id);
    }
}

/// One parsed query record: identifier (marker byte stripped) and payload.
pub struct QueryRecord {
    pub id: String,
    pub seq: Vec<u8>,
}

/// Reads 4-line records: identifier, sequence, then two auxiliary lines that
/// are discarded unread. A trailing record truncated after the sequence line
/// is accepted.
pub struct RecordReader<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    fn next_line(&mut self) -> io::Result<Option<&str>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end_matches(['\n', '\r'])))
    }

    pub fn next_record(&mut self) -> Result<Option<QueryRecord>> {
        let id = match self.next_line()? {
            Some(line) => {
                // Leading marker character of the identifier line is stripped.
                let mut chars = line.chars();
                chars.next();
                chars.as_str().to_string()
            }
            None => return Ok(None),
        };

        let seq = match self.next_line()? {
            Some(line) => line.as_bytes().to_vec(),
            None => {
                return Err(SearchError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("record {id:?} has an identifier line but no sequence line"),
                )));
            }
        };

        // Discard the two auxiliary lines if present.
        for _ in 0..2 {
            if self.next_line()?.is_none() {
                break;
            }
        }

        Ok(Some(QueryRecord { id, seq }))
    }
}

/// Why a fill pass stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The next query would exceed the byte budget; dispatch this slot.
    SlotFull,
    /// End of the input stream.
    Exhausted,
}

/// Packs records from a stream into buffer slots, carrying at most one
/// pending record across slot rotations.
pub struct QueryBatcher<R: BufRead> {
    reader: RecordReader<R>,
    budget: usize,
    pending: Option<QueryRecord>,
}

impl<R: BufRead> QueryBatcher<R> {
    pub fn new(reader: R, budget: usize) -> Self {
        Self {
            reader: RecordReader::new(reader),
            budget,
            pending: None,
        }
    }

    /// Fill `slot` until it is full or the stream ends.
    ///
    /// Fails with a configuration error when a single query alone exceeds
    /// the byte budget; for the first query this happens before any
    /// dispatch has occurred.
    pub fn fill(&mut self, slot: &mut SlotBuffers) -> Result<FillOutcome> {
        loop {
            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.reader.next_record()? {
                    Some(record) => record,
                    None => return Ok(FillOutcome::Exhausted),
                },
            };

            if slot.queries.len() + record.seq.len() > self.budget {
                if slot.is_empty() {
                    return Err(SearchError::Config(format!(
                        "batch byte budget {} is smaller than query {:?} ({} bytes)",
                        self.budget,
                        record.id,
                        record.seq.len()
                    )));
                }
                self.pending = Some(record);
                return Ok(FillOutcome::SlotFull);
            }

            slot.push(record);
        }
    }
}
