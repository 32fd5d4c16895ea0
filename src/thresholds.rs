// Precomputed threshold table.
//
// The table is an external collaborator: it maps an observed minimizer count
// to the minimum number of per-bin hits required for a match. Entry `i`
// applies to queries with `minimal_minimizers + i` observed minimizers. This
// crate only loads and validates the table; computing it is out of scope.

use crate::errors::{Result, SearchError};
use std::io::BufRead;

/// Minimizer-count bounds shared by all queries of one run.
///
/// All queries of a run have the same configured pattern length, so the
/// bounds are derived once:
/// `minimal = kmers_per_pattern / kmers_per_window` (floor) and
/// `maximal = pattern_len - window_size + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimizerBounds {
    pub minimal: u64,
    pub maximal: u64,
}

impl MinimizerBounds {
    pub fn derive(window_size: u8, kmer_size: u8, pattern_len: u64) -> Result<Self> {
        let window_size = window_size as u64;
        let kmer_size = kmer_size as u64;
        // K-mers are 2-bit packed into a u64, so 32 bases is the ceiling.
        if kmer_size == 0 || kmer_size > 32 {
            return Err(SearchError::Config(format!(
                "kmer size {kmer_size} outside the supported range 1..=32"
            )));
        }
        if kmer_size > window_size {
            return Err(SearchError::Config(format!(
                "kmer size {kmer_size} exceeds window size {window_size}"
            )));
        }
        if pattern_len < window_size {
            return Err(SearchError::Config(format!(
                "pattern length {pattern_len} shorter than window size {window_size}"
            )));
        }
        let kmers_per_window = window_size - kmer_size + 1;
        let kmers_per_pattern = pattern_len - kmer_size + 1;
        Ok(Self {
            minimal: kmers_per_pattern / kmers_per_window,
            maximal: pattern_len - window_size + 1,
        })
    }

    /// Number of distinct observable minimizer counts.
    pub fn span(&self) -> u64 {
        self.maximal - self.minimal + 1
    }
}

/// Ordered threshold sequence, indexed by `observed - minimal` minimizers.
#[derive(Debug)]
pub struct ThresholdTable {
    values: Vec<u64>,
}

impl ThresholdTable {
    pub fn new(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// Parse the interchange format: one non-negative integer per line.
    pub fn load(reader: impl BufRead) -> Result<Self> {
        let mut values = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value = trimmed.parse::<u64>().map_err(|_| {
                SearchError::Config(format!(
                    "threshold table line {}: expected a non-negative integer, got {trimmed:?}",
                    lineno + 1
                ))
            })?;
            values.push(value);
        }
        Ok(Self { values })
    }

    /// Validate that the table covers every observable minimizer count.
    pub fn validate(&self, bounds: &MinimizerBounds) -> Result<()> {
        if (self.values.len() as u64) < bounds.span() {
            return Err(SearchError::Config(format!(
                "threshold table has {} entries but minimizer counts {}..={} require {}",
                self.values.len(),
                bounds.minimal,
                bounds.maximal,
                bounds.span()
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
