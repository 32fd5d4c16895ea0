// Result chunk geometry.
//
// The accelerator transfers per-query hit bitmaps in fixed-width chunks
// matching its native bus width. The width is selected once at configuration
// time; everything downstream (buffer sizing, decoding) is generic over the
// resulting layout rather than hard-coded to one integer width.

use crate::errors::{Result, SearchError};

/// Widest supported accelerator bus, in bits.
pub const MAX_BUS_WIDTH: u64 = 512;

/// Native bus width of one result chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkWidth {
    W64,
    W128,
    W256,
    W512,
}

impl ChunkWidth {
    pub fn bits(self) -> u64 {
        match self {
            ChunkWidth::W64 => 64,
            ChunkWidth::W128 => 128,
            ChunkWidth::W256 => 256,
            ChunkWidth::W512 => 512,
        }
    }

    pub fn words(self) -> usize {
        (self.bits() / 64) as usize
    }

    /// Select the chunk width for an index: the smallest supported width
    /// covering `technical_bins`, capped at [`MAX_BUS_WIDTH`].
    pub fn for_bins(technical_bins: u64) -> Result<Self> {
        if technical_bins == 0 || technical_bins % 64 != 0 {
            return Err(SearchError::Config(format!(
                "technical_bins={technical_bins} is not a positive multiple of 64"
            )));
        }
        Ok(match technical_bins.min(MAX_BUS_WIDTH) {
            64 => ChunkWidth::W64,
            128 => ChunkWidth::W128,
            256 => ChunkWidth::W256,
            512 => ChunkWidth::W512,
            // 192, 320, 448: round up to the next power-of-two bus width.
            bits if bits < 256 => ChunkWidth::W256,
            _ => ChunkWidth::W512,
        })
    }
}

/// Derived geometry of one query's result area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultLayout {
    pub chunk_bits: u64,
    pub words_per_chunk: usize,
    pub chunks_per_query: usize,
    pub words_per_query: usize,
}

impl ResultLayout {
    pub fn new(technical_bins: u64, width: ChunkWidth) -> Result<Self> {
        let chunk_bits = width.bits();
        let words_per_chunk = width.words();
        let chunks_per_query = technical_bins.div_ceil(chunk_bits) as usize;
        let words_per_query = chunks_per_query * words_per_chunk;

        // Each query's result area must cover technical_bins exactly when the
        // width divides the bin count; a padded final chunk is only legal when
        // the bin count is below one bus width.
        if words_per_query as u64 * 64 < technical_bins {
            return Err(SearchError::Config(format!(
                "result layout too small: {} words for {technical_bins} bins",
                words_per_query
            )));
        }

        Ok(Self {
            chunk_bits,
            words_per_chunk,
            chunks_per_query,
            words_per_query,
        })
    }
}
