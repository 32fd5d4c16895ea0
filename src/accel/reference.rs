// Reference probe kernel.
//
// Emulation-grade software rendition of the device probe: extract the
// query's minimizers, probe each against the interleaved bit array, count
// per-bin hits and report every bin reaching the threshold for the observed
// minimizer count. Used by the simulator backend when no stub is injected.

use crate::accel::simulator::{DeviceContext, ProbeKernel};
use crate::utils::hash_64;

const KMER_SEED: u64 = 0x8F3F_73B5_CF1C_9ADE;

/// 2-bit encode one base; anything outside ACGT folds to 0.
fn base_code(base: u8) -> u64 {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => 0,
    }
}

/// Hashes of all k-mers of `query`, in order. `k` is validated to 1..=32 by
/// `MinimizerBounds::derive` before any kernel runs.
fn kmer_hashes(query: &[u8], k: usize) -> Vec<u64> {
    let mask = if k >= 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
    let mut hashes = Vec::with_capacity(query.len().saturating_sub(k - 1));
    let mut kmer = 0u64;
    for (i, &base) in query.iter().enumerate() {
        kmer = ((kmer << 2) | base_code(base)) & mask;
        if i + 1 >= k {
            hashes.push(hash_64(kmer ^ KMER_SEED));
        }
    }
    hashes
}

/// Minimizers of `query`: the minimum k-mer hash of each window, with runs
/// of the same occurrence collapsed.
fn minimizers(query: &[u8], w: usize, k: usize) -> Vec<u64> {
    let hashes = kmer_hashes(query, k);
    let kmers_per_window = w - k + 1;
    if hashes.len() < kmers_per_window {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut last: Option<(usize, u64)> = None;
    for window in 0..=hashes.len() - kmers_per_window {
        let mut arg = window;
        let mut min = hashes[window];
        for (offset, &h) in hashes[window..window + kmers_per_window].iter().enumerate() {
            if h < min {
                min = h;
                arg = window + offset;
            }
        }
        if last != Some((arg, min)) {
            out.push(min);
            last = Some((arg, min));
        }
    }
    out
}

/// Map a minimizer hash to its row in the bit array.
fn bin_row(hash: u64, ctx: &DeviceContext) -> usize {
    let mut x = hash ^ hash.checked_shr(ctx.hash_shift as u32).unwrap_or(0);
    x = x.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (x % ctx.bin_size) as usize
}

pub struct ReferenceKernel;

impl ProbeKernel for ReferenceKernel {
    fn probe(&self, query: &[u8], ctx: &DeviceContext, out: &mut [u64]) {
        let w = ctx.window_size as usize;
        let k = ctx.kmer_size as usize;
        if query.len() < w {
            return;
        }

        let minimizers = minimizers(query, w, k);
        if minimizers.is_empty() {
            return;
        }

        // Accumulate per-bin hit counts across all minimizer rows.
        let words_per_row = ctx.words_per_row;
        let mut counts = vec![0u64; ctx.technical_bins as usize];
        for &minimizer in &minimizers {
            let row = bin_row(minimizer, ctx);
            let row_words = &ctx.data[row * words_per_row..(row + 1) * words_per_row];
            for (word_idx, &word) in row_words.iter().enumerate() {
                let mut bits = word;
                while bits != 0 {
                    let bit = bits.trailing_zeros() as usize;
                    counts[word_idx * 64 + bit] += 1;
                    bits &= bits - 1;
                }
            }
        }

        let observed = minimizers.len() as u64;
        let index = (observed.saturating_sub(ctx.bounds.minimal) as usize)
            .min(ctx.thresholds.len().saturating_sub(1));
        let threshold = ctx.thresholds[index].max(1);

        for (bin, &count) in counts.iter().enumerate() {
            if count >= threshold {
                out[bin / 64] |= 1 << (bin % 64);
            }
        }
    }
}
