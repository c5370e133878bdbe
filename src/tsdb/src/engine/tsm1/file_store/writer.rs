use std::path::Path;

use bytes::BufMut;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::engine::tsm1::block::encoder::encode_block;
use crate::engine::tsm1::file_store::index::{IndexEntry, KeyEntries};
use crate::engine::tsm1::file_store::{HEADER, MAX_KEY_LENGTH};
use crate::engine::tsm1::value::Values;

/// TsmWriter writes TSM formatted keys and values.  Blocks are appended in
/// the order write is called; the caller is responsible for writing keys in
/// sorted order with sorted values.
pub struct TsmWriter {
    fd: File,
    index: Vec<KeyEntries>,

    /// Bytes written so far, which is also the offset of the next block.
    n: u64,
}

impl TsmWriter {
    pub async fn create(tsm_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut fd = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(tsm_path)
            .await
            .map_err(|e| anyhow!(e))?;

        fd.write_all(&HEADER).await?;

        Ok(Self {
            fd,
            index: Vec::new(),
            n: HEADER.len() as u64,
        })
    }

    /// write encodes values as one block for key.  The first and last
    /// timestamps become the block's index entry bounds.
    pub async fn write(&mut self, key: &[u8], values: &Values) -> anyhow::Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(anyhow!("max key length exceeded: {}", key.len()));
        }

        // Nothing to write
        if values.is_empty() {
            return Ok(());
        }

        let min_time = values.min_time();
        let max_time = values.max_time();

        let mut block = vec![];
        encode_block(&mut block, values)?;

        self.write_block(key, values.block_type(), min_time, max_time, &block)
            .await
    }

    /// write_block appends an already encoded block with its checksum and
    /// records the index entry.
    pub async fn write_block(
        &mut self,
        key: &[u8],
        typ: u8,
        min_time: i64,
        max_time: i64,
        block: &[u8],
    ) -> anyhow::Result<()> {
        let checksum = crc32fast::hash(block);
        self.fd.write_u32(checksum).await?;
        self.fd.write_all(block).await?;

        let entry = IndexEntry::new(min_time, max_time, self.n, 4 + block.len() as u32);
        self.n += entry.size as u64;

        match self.index.iter_mut().find(|b| b.key == key) {
            Some(blocks) => blocks.entries.push(entry),
            None => self.index.push(KeyEntries {
                key: key.to_vec(),
                typ,
                entries: vec![entry],
            }),
        }

        Ok(())
    }

    /// write_index finishes the data section and writes the index and the
    /// footer.  No further blocks may be written afterwards.
    pub async fn write_index(&mut self) -> anyhow::Result<()> {
        let index_start = self.n;

        // Index keys must be sorted, and each key's entries ordered by time.
        self.index.sort_by(|a, b| a.key.cmp(&b.key));

        let mut buf = Vec::new();
        for blocks in &mut self.index {
            blocks.entries.sort_by_key(|e| e.min_time);
            if blocks.entries.len() > u16::MAX as usize {
                return Err(anyhow!(
                    "key {:?} exceeds max index entries",
                    String::from_utf8_lossy(&blocks.key)
                ));
            }

            buf.put_u16(blocks.key.len() as u16);
            buf.extend_from_slice(&blocks.key);
            buf.push(blocks.typ);
            buf.put_u16(blocks.entries.len() as u16);
            for entry in &blocks.entries {
                entry.append_to(&mut buf);
            }
        }
        buf.put_u64(index_start);

        self.fd.write_all(&buf).await?;
        self.n += buf.len() as u64;
        Ok(())
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.fd.flush().await?;
        self.fd.sync_all().await?;
        Ok(())
    }

    /// size returns the current size of the file in bytes.
    pub fn size(&self) -> u64 {
        self.n
    }
}

impl Values {
    /// block_type returns the block type byte this value sequence encodes to.
    pub fn block_type(&self) -> u8 {
        match self {
            Values::Float(_) => crate::engine::tsm1::block::BLOCK_FLOAT64,
            Values::Integer(_) => crate::engine::tsm1::block::BLOCK_INTEGER,
            Values::Unsigned(_) => crate::engine::tsm1::block::BLOCK_UNSIGNED,
            Values::Boolean(_) => crate::engine::tsm1::block::BLOCK_BOOLEAN,
            Values::Str(_) => crate::engine::tsm1::block::BLOCK_STRING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tsm1::file_store::reader::TsmReader;
    use crate::engine::tsm1::value::Value;

    #[tokio::test]
    async fn test_writer_reader_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000000001-000000001.tsm");

        let mut w = TsmWriter::create(&path).await.unwrap();
        w.write(
            b"cpu,host=a#!~#value",
            &Values::Float(vec![Value::new(1, 1.5), Value::new(2, 3.0)]),
        )
        .await
        .unwrap();
        w.write(
            b"cpu,host=b#!~#value",
            &Values::Integer(vec![Value::new(10, 15), Value::new(20, 30)]),
        )
        .await
        .unwrap();
        w.write_index().await.unwrap();
        w.close().await.unwrap();

        let r = TsmReader::open(&path).await.unwrap();
        assert_eq!(r.key_count(), 2);

        let (key, typ) = r.key_at(0).unwrap();
        assert_eq!(key, b"cpu,host=a#!~#value");
        assert_eq!(typ, crate::engine::tsm1::block::BLOCK_FLOAT64);

        let entries = r.read_entries(b"cpu,host=a#!~#value");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].min_time, 1);
        assert_eq!(entries[0].max_time, 2);

        let values = r.read_at(&entries[0]).await.unwrap();
        assert_eq!(
            values,
            Values::Float(vec![Value::new(1, 1.5), Value::new(2, 3.0)])
        );

        let range = r.time_range();
        assert_eq!((range.min, range.max), (1, 20));

        assert!(r.read_entries(b"missing#!~#value").is_empty());
    }

    #[tokio::test]
    async fn test_multiple_blocks_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000000001-000000001.tsm");

        let mut w = TsmWriter::create(&path).await.unwrap();
        for block in 0..3_i64 {
            let values: Vec<Value<f64>> = (0..10)
                .map(|i| Value::new(block * 10 + i, (block * 10 + i) as f64))
                .collect();
            w.write(b"m,t=1#!~#x", &Values::Float(values)).await.unwrap();
        }
        w.write_index().await.unwrap();
        w.close().await.unwrap();

        let r = TsmReader::open(&path).await.unwrap();
        let entries = r.read_entries(b"m,t=1#!~#x");
        assert_eq!(entries.len(), 3);

        let mut all = Vec::new();
        for entry in entries {
            if let Values::Float(v) = r.read_at(entry).await.unwrap() {
                all.extend(v);
            }
        }
        assert_eq!(all.len(), 30);
        assert!(all.windows(2).all(|w| w[0].unix_nano < w[1].unix_nano));
    }

    #[tokio::test]
    async fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsm");
        std::fs::write(&path, b"this is not a tsm file at all").unwrap();

        assert!(TsmReader::open(&path).await.is_err());
    }
}
