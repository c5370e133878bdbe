use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};

use crate::cursor::{plan_locations, Cursor};
use crate::gemini::GeminiClient;
use crate::options::MigrateConfig;
use crate::scanner::Scanner;
use crate::stats::{
    GlobalStats, MeasurementCache, StatInfo, TagsCache, MEASUREMENT_CACHE_POOL, STAT_POOL,
    TAGS_CACHE_POOL,
};
use migrate_tsdb::engine::tsm1::file_store::reader::TsmReader;
use migrate_tsdb::engine::tsm1::{series_and_field_from_composite_key, series_field_key};
use migrate_tsdb::series::parse_series_key;

/// Migrator drives one shard: it owns the shard's open readers, the
/// series-to-fields map and the parse caches, and feeds every series
/// through a scanner into the batch writer.
pub struct Migrator {
    config: Arc<MigrateConfig>,

    /// Source database of the shard being migrated.
    database: String,

    files: Vec<Arc<TsmReader>>,
    /// series key -> set of field names seen across the shard's files
    serieskeys: BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>,

    stat: StatInfo,
    gstat: Arc<GlobalStats>,

    mst_cache: MeasurementCache,
    tags_cache: TagsCache,
}

impl Migrator {
    pub fn new(config: Arc<MigrateConfig>, database: String, gstat: Arc<GlobalStats>) -> Self {
        let mut stat = STAT_POOL.get();
        stat.reset();

        Self {
            config,
            database,
            files: Vec::new(),
            serieskeys: BTreeMap::new(),
            stat,
            gstat,
            mst_cache: MEASUREMENT_CACHE_POOL.get(),
            tags_cache: TAGS_CACHE_POOL.get(),
        }
    }

    /// migrate_tsm_files reads the shard's files and writes their contents
    /// to the destination.  Readers are closed on every exit path.
    pub async fn migrate_tsm_files(&mut self, mut files: Vec<PathBuf>) -> anyhow::Result<()> {
        // Keep the same order the files were written in
        files.sort();

        for f in &files {
            info!("Dealing file: {}", f.display());
            if let Err(e) = self.read_tsm_file(f).await {
                self.release_readers();
                return Err(e);
            }
        }

        let result = self.write_current_files().await;
        self.release_readers();
        result
    }

    async fn read_tsm_file(&mut self, path: &Path) -> anyhow::Result<()> {
        if let Err(e) = tokio::fs::metadata(path).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!("read_tsm_file: missing file skipped: {}", path.display());
                return Ok(());
            }
            return Err(e.into());
        }

        let r = match TsmReader::open(path).await {
            Ok(r) => r,
            Err(e) => {
                error!("unable to read {}, skipping: {}", path.display(), e);
                return Ok(());
            }
        };

        // If the time range of this file does not meet the conditions,
        // abort reading.
        let range = r.time_range();
        if range.min > self.config.end_time || range.max < self.config.start_time {
            return Ok(());
        }

        let r = Arc::new(r);

        // collect the keys
        for i in 0..r.key_count() {
            if let Some((key, _typ)) = r.key_at(i) {
                let (series, field) = series_and_field_from_composite_key(key);
                self.serieskeys
                    .entry(series.to_vec())
                    .or_default()
                    .insert(field.to_vec());
            }
        }

        self.files.push(r);
        Ok(())
    }

    async fn write_current_files(&mut self) -> anyhow::Result<()> {
        let client = GeminiClient::new(&self.config)?;
        let dest_db = self.config.dest_db(&self.database).to_string();

        let serieskeys = std::mem::take(&mut self.serieskeys);
        for (series, fields) in &serieskeys {
            let (measurement, tags) = self.parse_series_cached(series)?;

            let mut cursors = Vec::with_capacity(fields.len());
            for field in fields {
                let key = series_field_key(series, field);
                let seeks = plan_locations(
                    &self.files,
                    &key,
                    self.config.start_time,
                    self.config.end_time,
                );

                let mut cursor = Cursor::new(
                    key,
                    self.config.end_time,
                    seeks,
                    self.config.tombstone_endpoints,
                );
                cursor.init().await?;

                cursors.push((String::from_utf8_lossy(field).to_string(), cursor));
            }

            let mut scanner = Scanner::new(measurement, tags, cursors).await?;
            scanner
                .write_batches(&client, &dest_db, &self.config, &mut self.stat, &self.gstat)
                .await?;
        }

        Ok(())
    }

    /// parse_series_cached splits a series key into measurement and tags,
    /// serving repeated keys from the shard's LRU caches.
    fn parse_series_cached(
        &mut self,
        series: &[u8],
    ) -> anyhow::Result<(String, BTreeMap<String, String>)> {
        if let Some(measurement) = self.mst_cache.get(series) {
            if let Some(tags) = self.tags_cache.get(series) {
                return Ok((measurement.clone(), tags.clone()));
            }
        }

        let (measurement, tags) = parse_series_key(series)?;
        self.mst_cache.put(series.to_vec(), measurement.clone());
        self.tags_cache.put(series.to_vec(), tags.clone());
        Ok((measurement, tags))
    }

    fn release_readers(&mut self) {
        // Dropping the readers closes the underlying files.
        self.files.clear();
        self.serieskeys.clear();
    }

    pub fn stat(&self) -> &StatInfo {
        &self.stat
    }

    /// release returns the pooled scratch for reuse by the next shard.
    pub fn release(self) {
        let Migrator {
            stat,
            mst_cache,
            tags_cache,
            ..
        } = self;
        STAT_POOL.put(stat);
        MEASUREMENT_CACHE_POOL.put(mst_cache);
        TAGS_CACHE_POOL.put(tags_cache);
    }
}
