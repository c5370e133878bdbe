use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::engine::tsm1::block::decoder::decode_block;
use crate::engine::tsm1::file_store::index::{DirectIndex, IndexEntry};
use crate::engine::tsm1::file_store::tombstone::{read_tombstones, tombstone_path, Tombstones};
use crate::engine::tsm1::file_store::{TimeRange, FOOTER_SIZE, HEADER};
use crate::engine::tsm1::value::Values;

/// TsmReader provides random access to the blocks of one on-disk TSM file.
/// The index and tombstones are parsed eagerly at open; block data is read
/// and decoded on demand.
pub struct TsmReader {
    path: PathBuf,
    file: Mutex<File>,

    index: DirectIndex,
    tombstones: Tombstones,

    /// The first byte past the data blocks; blocks may not read beyond it.
    max_offset: u64,
}

impl TsmReader {
    /// open reads the file header, footer, index section and any sibling
    /// tombstone file.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).await?;

        Self::verify_version(&mut file).await?;

        let file_size = file.metadata().await?.len();
        if file_size < HEADER.len() as u64 + FOOTER_SIZE {
            return Err(anyhow!("tsm file {:?} too small for index", path));
        }

        let index_ofs_pos = file_size - FOOTER_SIZE;
        file.seek(SeekFrom::Start(index_ofs_pos)).await?;
        let index_start = file.read_u64().await?;
        if index_start > index_ofs_pos || index_start < HEADER.len() as u64 {
            return Err(anyhow!("tsm file {:?} has a corrupt index offset", path));
        }

        file.seek(SeekFrom::Start(index_start)).await?;
        let mut index_buf = vec![0_u8; (index_ofs_pos - index_start) as usize];
        file.read_exact(&mut index_buf).await?;
        let index = DirectIndex::from_bytes(&index_buf)?;

        let tombstones = read_tombstones(&tombstone_path(&path)).await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            index,
            tombstones,
            max_offset: index_start,
        })
    }

    async fn verify_version(file: &mut File) -> anyhow::Result<()> {
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| anyhow!("init: error reading magic number of file: {}", e))?;

        let magic_number = file
            .read_u32()
            .await
            .map_err(|e| anyhow!("init: error reading magic number of file: {}", e))?;
        if magic_number != crate::engine::tsm1::MAGIC_NUMBER {
            return Err(anyhow!("can only read from tsm file"));
        }

        let version = file
            .read_u8()
            .await
            .map_err(|e| anyhow!("init: error reading version: {}", e))?;
        if version != crate::engine::tsm1::VERSION {
            return Err(anyhow!(
                "init: file is version {}. expected {}",
                version,
                crate::engine::tsm1::VERSION
            ));
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// key_count returns the number of distinct composite keys in the file.
    pub fn key_count(&self) -> usize {
        self.index.key_count()
    }

    /// key_at returns the key and block type at index position idx.
    pub fn key_at(&self, idx: usize) -> Option<(&[u8], u8)> {
        self.index.key_at(idx)
    }

    /// read_entries returns the block entries for a key, empty if the key is
    /// not present in this file.
    pub fn read_entries(&self, key: &[u8]) -> &[IndexEntry] {
        self.index
            .entries(key)
            .map(|b| b.entries.as_slice())
            .unwrap_or(&[])
    }

    /// block_type returns the type byte of the blocks stored for key.
    pub fn block_type(&self, key: &[u8]) -> anyhow::Result<u8> {
        self.index
            .entries(key)
            .map(|b| b.typ)
            .ok_or_else(|| anyhow!("key {:?} not found", String::from_utf8_lossy(key)))
    }

    /// tombstone_range returns the deleted time ranges for the given key.
    pub fn tombstone_range(&self, key: &[u8]) -> &[TimeRange] {
        self.tombstones
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_tombstones(&self) -> bool {
        !self.tombstones.is_empty()
    }

    /// time_range returns the min and max time across all keys in the file.
    pub fn time_range(&self) -> TimeRange {
        let (min, max) = self.index.time_range();
        TimeRange::new(min, max)
    }

    /// read_at reads and decodes the block identified by entry.
    pub async fn read_at(&self, entry: &IndexEntry) -> anyhow::Result<Values> {
        if entry.size < 4 {
            return Err(anyhow!("read_at: block size {} too small", entry.size));
        }
        if entry.offset + entry.size as u64 > self.max_offset {
            return Err(anyhow!(
                "read_at: block at {} runs past the data section",
                entry.offset
            ));
        }

        let mut buf = vec![0_u8; entry.size as usize];
        {
            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(entry.offset)).await?;
            file.read_exact(&mut buf).await?;
        }

        // The first 4 bytes of every block hold its checksum.
        let want = u32::from_be_bytes(buf[..4].try_into().unwrap());
        let got = crc32fast::hash(&buf[4..]);
        if want != got {
            return Err(anyhow!(
                "read_at: block checksum mismatch in {:?} at offset {}",
                self.path,
                entry.offset
            ));
        }

        decode_block(&buf[4..])
    }
}
