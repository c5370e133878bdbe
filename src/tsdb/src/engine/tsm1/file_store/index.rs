use std::fmt::{Display, Formatter};

use bytes::BufMut;
use migrate_utils::time::unix_nano_to_time;

/// INDEX_ENTRY_SIZE is the on-disk size of one block entry.
pub const INDEX_ENTRY_SIZE: usize = 28;

/// IndexEntry is the index information for a given block in a TSM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// The min and max time of all points stored in the block.
    pub min_time: i64,
    pub max_time: i64,

    /// The absolute position in the file where this block is located.
    pub offset: u64,

    /// The size in bytes of the block in the file, including the checksum.
    pub size: u32,
}

impl IndexEntry {
    pub fn new(min_time: i64, max_time: i64, offset: u64, size: u32) -> Self {
        Self {
            min_time,
            max_time,
            offset,
            size,
        }
    }

    /// unmarshal_binary decodes an IndexEntry from a byte slice.
    pub fn unmarshal_binary(b: &[u8]) -> anyhow::Result<Self> {
        if b.len() < INDEX_ENTRY_SIZE {
            return Err(anyhow!(
                "unmarshal_binary: short buf: {} < {}",
                b.len(),
                INDEX_ENTRY_SIZE
            ));
        }

        let min_time = u64::from_be_bytes(b[..8].try_into().unwrap()) as i64;
        let max_time = u64::from_be_bytes(b[8..16].try_into().unwrap()) as i64;
        let offset = u64::from_be_bytes(b[16..24].try_into().unwrap());
        let size = u32::from_be_bytes(b[24..28].try_into().unwrap());

        Ok(Self {
            min_time,
            max_time,
            offset,
            size,
        })
    }

    /// append_to writes the binary-encoded form of the entry to b.
    pub fn append_to(&self, b: &mut Vec<u8>) {
        b.put_u64(self.min_time as u64);
        b.put_u64(self.max_time as u64);
        b.put_u64(self.offset);
        b.put_u32(self.size);
    }

    /// contains returns true if this entry may contain values for the given
    /// time.  The min and max times are inclusive.
    pub fn contains(&self, t: i64) -> bool {
        self.min_time <= t && self.max_time >= t
    }

    /// overlaps_time_range returns true if the inclusive range intersects
    /// the entry's time bounds.
    pub fn overlaps_time_range(&self, min: i64, max: i64) -> bool {
        self.min_time <= max && self.max_time >= min
    }
}

impl Display for IndexEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min={} max={} ofs={} siz={}",
            unix_nano_to_time(self.min_time),
            unix_nano_to_time(self.max_time),
            self.offset,
            self.size,
        )
    }
}

/// KeyEntries holds the typed block entries of one composite key.
#[derive(Debug, Clone)]
pub struct KeyEntries {
    pub key: Vec<u8>,
    pub typ: u8,
    pub entries: Vec<IndexEntry>,
}

/// DirectIndex is a fully parsed in-memory copy of a TSM file's index
/// section.  Keys are stored in the file's order, which is sorted.
#[derive(Debug)]
pub struct DirectIndex {
    blocks: Vec<KeyEntries>,
    min_time: i64,
    max_time: i64,
}

impl DirectIndex {
    /// from_bytes parses a raw index section.
    pub fn from_bytes(buf: &[u8]) -> anyhow::Result<Self> {
        let mut blocks = Vec::new();
        let mut min_time = i64::MAX;
        let mut max_time = i64::MIN;

        let mut i = 0_usize;
        while i < buf.len() {
            if i + 2 > buf.len() {
                return Err(anyhow!("index: truncated key length"));
            }
            let key_len = u16::from_be_bytes(buf[i..i + 2].try_into().unwrap()) as usize;
            i += 2;

            if i + key_len + 3 > buf.len() {
                return Err(anyhow!("index: truncated key"));
            }
            let key = buf[i..i + key_len].to_vec();
            i += key_len;

            let typ = buf[i];
            i += 1;

            let count = u16::from_be_bytes(buf[i..i + 2].try_into().unwrap()) as usize;
            i += 2;
            if count == 0 {
                return Err(anyhow!("index: key with no block entries"));
            }

            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let entry = IndexEntry::unmarshal_binary(&buf[i..])?;
                i += INDEX_ENTRY_SIZE;

                if entry.min_time < min_time {
                    min_time = entry.min_time;
                }
                if entry.max_time > max_time {
                    max_time = entry.max_time;
                }
                entries.push(entry);
            }

            blocks.push(KeyEntries { key, typ, entries });
        }

        Ok(Self {
            blocks,
            min_time,
            max_time,
        })
    }

    pub fn key_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn key_at(&self, idx: usize) -> Option<(&[u8], u8)> {
        self.blocks.get(idx).map(|b| (b.key.as_slice(), b.typ))
    }

    pub fn entries(&self, key: &[u8]) -> Option<&KeyEntries> {
        self.blocks
            .binary_search_by(|b| b.key.as_slice().cmp(key))
            .ok()
            .map(|i| &self.blocks[i])
    }

    /// time_range returns the min and max time across all keys in the file.
    pub fn time_range(&self) -> (i64, i64) {
        (self.min_time, self.max_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_entry_round_trip() {
        let entry = IndexEntry::new(-42, 1_000_000, 5, 128);
        let mut b = vec![];
        entry.append_to(&mut b);
        assert_eq!(b.len(), INDEX_ENTRY_SIZE);

        let got = IndexEntry::unmarshal_binary(&b).unwrap();
        assert_eq!(got, entry);
    }

    #[test]
    fn test_index_entry_short_buf() {
        assert!(IndexEntry::unmarshal_binary(&[0; 10]).is_err());
    }
}
