// Index management module
//
// Loads the serialized Interleaved Bloom Filter archive into an immutable
// in-memory bit array plus its derived geometry. The archive layout is fixed
// (little-endian, field order below) for interoperability with existing
// index files:
//
// 1. bins: u64                number of user bins
// 2. technical_bins: u64     bins rounded up to the next multiple of 64
// 3. bin_size: u64           size of each bin in bits
// 4. hash_shift: u64         bits to shift a hash before multiplicative hashing
// 5. bin_words: u64          reserved (legacy field)
// 6. hash_funs: u64          reserved (legacy field)
// 7. bit_count: u64          length of the bit array in bits
// 8. bit array               bit_count / 64 raw u64 words

use crate::errors::{Result, SearchError};
use std::io::{Read, Write};

/// Immutable Interleaved Bloom Filter index.
///
/// Loaded once, handed to the accelerator binding for device-side transfer,
/// and never mutated for the lifetime of the pipeline.
#[derive(Debug)]
pub struct IbfIndex {
    pub window_size: u8,
    pub kmer_size: u8,
    pub bins: u64,
    pub technical_bins: u64,
    pub bin_size: u64,
    pub hash_shift: u64,
    pub bin_words: u64,
    pub hash_funs: u64,
    /// Raw bit array; `data.len() * 64 == bit_count`, bins interleaved per row.
    pub data: Vec<u64>,
}

fn read_u64(reader: &mut impl Read, field: &str) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|_| SearchError::CorruptIndex(format!("archive truncated reading {field}")))?;
    Ok(u64::from_le_bytes(buf))
}

impl IbfIndex {
    /// Load an index archive.
    ///
    /// `window_size` and `kmer_size` are construction parameters carried by
    /// the caller (they are not stored in the archive) and are only recorded
    /// here so the accelerator binding can derive the artifact name.
    pub fn load(reader: &mut impl Read, window_size: u8, kmer_size: u8) -> Result<Self> {
        let bins = read_u64(reader, "bins")?;
        let technical_bins = read_u64(reader, "technical_bins")?;
        let bin_size = read_u64(reader, "bin_size")?;
        let hash_shift = read_u64(reader, "hash_shift")?;
        let bin_words = read_u64(reader, "bin_words")?;
        let hash_funs = read_u64(reader, "hash_funs")?;
        let bit_count = read_u64(reader, "bit_count")?;

        if technical_bins == 0 || technical_bins % 64 != 0 {
            return Err(SearchError::CorruptIndex(format!(
                "technical_bins={technical_bins} is not a positive multiple of 64"
            )));
        }
        if technical_bins < bins {
            return Err(SearchError::CorruptIndex(format!(
                "technical_bins={technical_bins} smaller than bins={bins}"
            )));
        }
        if bit_count % 64 != 0 {
            return Err(SearchError::CorruptIndex(format!(
                "bit array length {bit_count} is not a multiple of 64"
            )));
        }
        if technical_bins.checked_mul(bin_size) != Some(bit_count) {
            return Err(SearchError::CorruptIndex(format!(
                "bit array length {bit_count} does not match \
                 technical_bins {technical_bins} * bin_size {bin_size}"
            )));
        }

        let word_count = (bit_count / 64) as usize;
        let mut data = Vec::with_capacity(word_count);
        let mut buf = [0u8; 8];
        for _ in 0..word_count {
            reader.read_exact(&mut buf).map_err(|_| {
                SearchError::CorruptIndex("archive truncated reading bit array".into())
            })?;
            data.push(u64::from_le_bytes(buf));
        }

        log::debug!(
            "Loaded IBF index: bins={bins}, technical_bins={technical_bins}, bin_size={bin_size}, \
             hash_shift={hash_shift}, bits={bit_count}"
        );

        Ok(Self {
            window_size,
            kmer_size,
            bins,
            technical_bins,
            bin_size,
            hash_shift,
            bin_words,
            hash_funs,
            data,
        })
    }

    /// Serialize the index in the exact field order of [`IbfIndex::load`].
    /// Re-serializing a loaded archive reproduces it byte for byte.
    pub fn save(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&self.bins.to_le_bytes())?;
        writer.write_all(&self.technical_bins.to_le_bytes())?;
        writer.write_all(&self.bin_size.to_le_bytes())?;
        writer.write_all(&self.hash_shift.to_le_bytes())?;
        writer.write_all(&self.bin_words.to_le_bytes())?;
        writer.write_all(&self.hash_funs.to_le_bytes())?;
        let bit_count = self.data.len() as u64 * 64;
        writer.write_all(&bit_count.to_le_bytes())?;
        for word in &self.data {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Number of 64-bit words holding one interleaved row of all bins.
    pub fn words_per_row(&self) -> usize {
        (self.technical_bins / 64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_index() -> IbfIndex {
        IbfIndex {
            window_size: 23,
            kmer_size: 19,
            bins: 60,
            technical_bins: 64,
            bin_size: 4,
            hash_shift: 2,
            bin_words: 1,
            hash_funs: 2,
            data: vec![0xdead_beef_0000_0001, 0, u64::MAX, 0x8000_0000_0000_0000],
        }
    }

    #[test]
    fn test_archive_round_trip() {
        let index = sample_index();
        let mut archive = Vec::new();
        index.save(&mut archive).unwrap();

        let loaded = IbfIndex::load(&mut Cursor::new(&archive), 23, 19).unwrap();
        assert_eq!(loaded.bins, index.bins);
        assert_eq!(loaded.technical_bins, index.technical_bins);
        assert_eq!(loaded.bin_size, index.bin_size);
        assert_eq!(loaded.hash_shift, index.hash_shift);
        assert_eq!(loaded.data, index.data);

        let mut rewritten = Vec::new();
        loaded.save(&mut rewritten).unwrap();
        assert_eq!(rewritten, archive);
    }

    #[test]
    fn test_truncated_archive_is_corrupt() {
        let index = sample_index();
        let mut archive = Vec::new();
        index.save(&mut archive).unwrap();
        archive.truncate(archive.len() - 3);

        let err = IbfIndex::load(&mut Cursor::new(&archive), 23, 19).unwrap_err();
        assert!(matches!(err, SearchError::CorruptIndex(_)));
    }

    #[test]
    fn test_inconsistent_geometry_is_corrupt() {
        let mut index = sample_index();
        index.technical_bins = 63; // not a multiple of 64
        let mut archive = Vec::new();
        index.save(&mut archive).unwrap();

        let err = IbfIndex::load(&mut Cursor::new(&archive), 23, 19).unwrap_err();
        assert!(matches!(err, SearchError::CorruptIndex(_)));
    }

    #[test]
    fn test_bit_count_mismatch_is_corrupt() {
        let mut index = sample_index();
        index.bin_size = 5; // bit array no longer matches technical_bins * bin_size
        let mut archive = Vec::new();
        index.save(&mut archive).unwrap();

        let err = IbfIndex::load(&mut Cursor::new(&archive), 23, 19).unwrap_err();
        assert!(matches!(err, SearchError::CorruptIndex(_)));
    }
}
