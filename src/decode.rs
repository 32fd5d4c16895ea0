// Result decoding.
//
// Unpacks a batch's raw per-query result chunks into text: one line per
// query, identifier, a tab, then the ascending bin positions of every set
// bit, comma-separated. A pure function of the result words; decoding the
// same bytes twice yields byte-identical output.

use crate::batch::SlotBuffers;
use crate::chunk::ResultLayout;
use std::fmt::Write;

/// Decode one batch in arrival order, appending to `out`.
pub fn decode_batch(ids: &[String], results: &[u64], layout: &ResultLayout, out: &mut String) {
    let words_per_query = layout.words_per_query;
    let words_per_chunk = layout.words_per_chunk;

    for (query_index, id) in ids.iter().enumerate() {
        out.push_str(id);
        out.push('\t');

        let words = &results[query_index * words_per_query..(query_index + 1) * words_per_query];
        let mut first = true;

        for (chunk_offset, chunk) in words.chunks_exact(words_per_chunk).enumerate() {
            let chunk_base = chunk_offset as u64 * layout.chunk_bits;

            for (element_offset, &element) in chunk.iter().enumerate() {
                // Whole-word and whole-byte skips; an optimization only.
                if element == 0 {
                    continue;
                }
                let element_base = chunk_base + element_offset as u64 * 64;

                for byte_offset in 0..8u64 {
                    let value = (element >> (byte_offset * 8)) as u8;
                    if value == 0 {
                        continue;
                    }

                    let mut mask = 1u8;
                    for bit_offset in 0..8u64 {
                        if value & mask != 0 {
                            if !first {
                                out.push(',');
                            }
                            first = false;
                            let position = element_base + byte_offset * 8 + bit_offset;
                            write!(out, "{position}").expect("writing to a String cannot fail");
                        }
                        mask <<= 1;
                    }
                }
            }
        }
        out.push('\n');
    }
}

/// Decode a waited slot and clear it for refilling.
pub fn decode_slot(slot: &mut SlotBuffers, layout: &ResultLayout, out: &mut String) {
    decode_batch(&slot.ids, &slot.results, layout, out);
    slot.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkWidth;

    fn layout64() -> ResultLayout {
        ResultLayout::new(64, ChunkWidth::W64).unwrap()
    }

    #[test]
    fn test_decode_synthetic_chunk_positions() {
        // Two 64-bin chunks of one 128-bin query: bits {0, 63, 64, 127}.
        let layout = ResultLayout::new(128, ChunkWidth::W128).unwrap();
        let ids = vec!["read1".to_string()];
        let results = vec![(1u64 << 63) | 1, (1u64 << 63) | 1];

        let mut out = String::new();
        decode_batch(&ids, &results, &layout, &mut out);
        assert_eq!(out, "read1\t0,63,64,127\n");
    }

    #[test]
    fn test_decode_is_idempotent() {
        let layout = layout64();
        let ids = vec!["a".to_string(), "b".to_string()];
        let results = vec![0b1010, 0];

        let mut first = String::new();
        decode_batch(&ids, &results, &layout, &mut first);
        let mut second = String::new();
        decode_batch(&ids, &results, &layout, &mut second);

        assert_eq!(first, second);
        assert_eq!(first, "a\t1,3\nb\t\n");
    }

    #[test]
    fn test_decode_zero_hits_is_empty_list() {
        let layout = layout64();
        let ids = vec!["read1".to_string()];
        let results = vec![0u64];

        let mut out = String::new();
        decode_batch(&ids, &results, &layout, &mut out);
        assert_eq!(out, "read1\t\n");
    }

    #[test]
    fn test_decode_random_words_is_idempotent() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let layout = ResultLayout::new(256, ChunkWidth::W256).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let ids: Vec<String> = (0..16).map(|i| format!("read{i}")).collect();
        let results: Vec<u64> = (0..16 * layout.words_per_query)
            .map(|_| rng.gen())
            .collect();

        let mut first = String::new();
        decode_batch(&ids, &results, &layout, &mut first);
        let mut second = String::new();
        decode_batch(&ids, &results, &layout, &mut second);
        assert_eq!(first, second);

        // Positions on every line are strictly ascending.
        for line in first.lines() {
            let (_, list) = line.split_once('\t').unwrap();
            let positions: Vec<u64> = list
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "line {line:?}");
        }
    }

    #[test]
    fn test_decode_wide_chunk_positions_ascend() {
        // 512-bin query in one 512-bit chunk; set a bit in each word.
        let layout = ResultLayout::new(512, ChunkWidth::W512).unwrap();
        let ids = vec!["q".to_string()];
        let mut results = vec![0u64; 8];
        for (i, word) in results.iter_mut().enumerate() {
            *word = 1 << (i % 64);
        }

        let mut out = String::new();
        decode_batch(&ids, &results, &layout, &mut out);
        assert_eq!(out, "q\t0,65,130,195,260,325,390,455\n");
    }
}
