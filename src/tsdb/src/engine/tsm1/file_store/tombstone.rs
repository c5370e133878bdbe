//! Tombstone files record deletions against a sibling TSM file.  Four
//! on-disk formats exist: v1 is plain text with one key per line, v2 is a
//! binary record stream, v3 wraps the records in a single gzip stream and
//! v4 appends independent gzip streams so new tombstones can be added
//! without rewriting the file.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::BufMut;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::engine::tsm1::file_store::TimeRange;
use crate::engine::TOMBSTONE_FILE_EXTENSION;

const HEADER_SIZE: usize = 4;
const V2_HEADER: u32 = 0x1502;
const V3_HEADER: u32 = 0x1503;
const V4_HEADER: u32 = 0x1504;

/// Tombstones maps composite keys to their deleted time ranges.
pub type Tombstones = HashMap<Vec<u8>, Vec<TimeRange>>;

/// tombstone_path derives the tombstone file path that belongs to a TSM
/// file, e.g. 000001-01.tsm -> 000001-01.tombstone.
pub fn tombstone_path(tsm_path: &Path) -> PathBuf {
    tsm_path.with_extension(TOMBSTONE_FILE_EXTENSION)
}

/// read_tombstones parses a tombstone file of any supported version.
/// Returns an empty map if the file does not exist.
pub async fn read_tombstones(path: &Path) -> anyhow::Result<Tombstones> {
    let buf = match tokio::fs::read(path).await {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Tombstones::new()),
        Err(e) => return Err(anyhow!("tombstone: unable to read {:?}: {}", path, e)),
    };

    if buf.len() < HEADER_SIZE {
        // A short file cannot carry a binary header; treat it as v1 text.
        return parse_v1(&buf);
    }

    let header = u32::from_be_bytes(buf[..HEADER_SIZE].try_into().unwrap());
    match header {
        V3_HEADER | V4_HEADER => {
            let mut records = Vec::new();
            MultiGzDecoder::new(&buf[HEADER_SIZE..])
                .read_to_end(&mut records)
                .map_err(|e| anyhow!("tombstone: corrupt gzip stream in {:?}: {}", path, e))?;
            parse_records(&records)
        }
        V2_HEADER => parse_records(&buf[HEADER_SIZE..]),
        _ => parse_v1(&buf),
    }
}

/// parse_records decodes the binary record stream shared by v2, v3 and v4:
/// a 4 byte key length, the key, and the 8 byte min and max times.
fn parse_records(mut b: &[u8]) -> anyhow::Result<Tombstones> {
    let mut tombstones = Tombstones::new();

    while !b.is_empty() {
        if b.len() < 4 {
            return Err(anyhow!("tombstone: truncated key length"));
        }
        let key_len = u32::from_be_bytes(b[..4].try_into().unwrap()) as usize;
        b = &b[4..];

        if b.len() < key_len + 16 {
            return Err(anyhow!("tombstone: truncated record"));
        }
        let key = b[..key_len].to_vec();
        b = &b[key_len..];

        let min = i64::from_be_bytes(b[..8].try_into().unwrap());
        let max = i64::from_be_bytes(b[8..16].try_into().unwrap());
        b = &b[16..];

        tombstones
            .entry(key)
            .or_insert_with(Vec::new)
            .push(TimeRange::new(min, max));
    }

    Ok(tombstones)
}

/// parse_v1 decodes the legacy text format: one key per line, deleting the
/// key's full time range.
fn parse_v1(buf: &[u8]) -> anyhow::Result<Tombstones> {
    let text = std::str::from_utf8(buf)
        .map_err(|_| anyhow!("tombstone: v1 file is not valid utf-8"))?;

    let mut tombstones = Tombstones::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tombstones
            .entry(line.as_bytes().to_vec())
            .or_insert_with(Vec::new)
            .push(TimeRange::unbound());
    }
    Ok(tombstones)
}

/// TombstoneWriter accumulates deletion records and flushes them as one v4
/// tombstone file.
pub struct TombstoneWriter {
    path: PathBuf,
    records: Vec<(Vec<u8>, TimeRange)>,
}

impl TombstoneWriter {
    /// new creates a writer for the tombstone file belonging to tsm_path.
    pub fn new(tsm_path: impl AsRef<Path>) -> Self {
        Self {
            path: tombstone_path(tsm_path.as_ref()),
            records: Vec::new(),
        }
    }

    /// add_range records a deletion of keys between min and max.
    pub fn add_range(&mut self, keys: &[&[u8]], min: i64, max: i64) {
        for key in keys {
            self.records.push((key.to_vec(), TimeRange::new(min, max)));
        }
    }

    /// flush writes all recorded tombstones to disk.
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        let mut body = Vec::new();
        for (key, range) in &self.records {
            body.put_u32(key.len() as u32);
            body.extend_from_slice(key);
            body.put_i64(range.min);
            body.put_i64(range.max);
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len() / 2);
        out.put_u32(V4_HEADER);

        let mut enc = GzEncoder::new(&mut out, Compression::default());
        enc.write_all(&body)?;
        enc.finish()?;

        tokio::fs::write(&self.path, &out)
            .await
            .map_err(|e| anyhow!("tombstone: unable to write {:?}: {}", self.path, e))?;
        self.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone_path() {
        assert_eq!(
            tombstone_path(Path::new("/data/db/rp/1/000001-01.tsm")),
            PathBuf::from("/data/db/rp/1/000001-01.tombstone")
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let got = read_tombstones(Path::new("/no/such/file.tombstone"))
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_v4_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tsm_path = dir.path().join("000001-01.tsm");

        let mut w = TombstoneWriter::new(&tsm_path);
        w.add_range(&[b"cpu#!~#value", b"mem#!~#free"], 10, 50);
        w.add_range(&[b"cpu#!~#value"], 100, 200);
        w.flush().await.unwrap();

        let got = read_tombstones(&tombstone_path(&tsm_path)).await.unwrap();
        assert_eq!(
            got.get(b"cpu#!~#value".as_slice()).unwrap(),
            &vec![TimeRange::new(10, 50), TimeRange::new(100, 200)]
        );
        assert_eq!(
            got.get(b"mem#!~#free".as_slice()).unwrap(),
            &vec![TimeRange::new(10, 50)]
        );
    }

    #[tokio::test]
    async fn test_v1_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001-01.tombstone");
        std::fs::write(&path, "cpu#!~#value\nmem#!~#free\n").unwrap();

        let got = read_tombstones(&path).await.unwrap();
        assert_eq!(
            got.get(b"cpu#!~#value".as_slice()).unwrap(),
            &vec![TimeRange::unbound()]
        );
        assert_eq!(got.len(), 2);
    }
}
