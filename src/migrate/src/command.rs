use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use walkdir::WalkDir;

use crate::dispatch::run_groups;
use crate::gemini::GeminiClient;
use crate::options::{DataMigrateOptions, MigrateConfig};
use crate::shard::{build_shard_groups, ShardInfo};
use crate::stats::GlobalStats;
use migrate_tsdb::engine::TSM_FILE_EXTENSION;

/// MigrateCommand is the top level run: discovery, shard grouping and the
/// worker pool dispatch.
pub struct MigrateCommand {
    config: Arc<MigrateConfig>,
    gstat: Arc<GlobalStats>,
}

impl MigrateCommand {
    pub fn new(opts: DataMigrateOptions) -> anyhow::Result<Self> {
        Ok(Self {
            config: Arc::new(opts.resolve()?),
            gstat: Arc::new(GlobalStats::default()),
        })
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let started = Instant::now();

        let manifest = self.walk_tsm_files()?;
        if manifest.is_empty() {
            info!(
                "no tsm files found under {}",
                self.config.data_dir.display()
            );
            return Ok(());
        }

        // The destination's shard group duration drives grouping; not being
        // able to query it is fatal.
        let client = GeminiClient::new(&self.config)?;
        let meta_db = if !self.config.dest_database.is_empty() {
            self.config.dest_database.clone()
        } else {
            manifest[0].database.clone()
        };
        let duration = client
            .shard_group_duration(&meta_db, &self.config.retention_policy)
            .await?;
        info!(
            "destination shard group duration: {}s",
            duration / 1_000_000_000
        );

        let groups = build_shard_groups(manifest, duration).await?;
        info!(
            "migrating {} shard groups with {} workers",
            groups.len(),
            num_cpus::get().max(1)
        );

        run_groups(groups, self.config.clone(), self.gstat.clone()).await?;

        info!(
            "migration finished: {} rows, {} shards, {} distinct tags, {} distinct fields, took {:.2?}",
            self.gstat.rows_migrated.load(Ordering::Relaxed),
            self.gstat.shards_done.load(Ordering::Relaxed),
            self.gstat.tags_total.len(),
            self.gstat.field_total.len(),
            started.elapsed()
        );
        Ok(())
    }

    /// walk_tsm_files scans the data directory for shard directories and
    /// their TSM files.  The layout is <db>/<rp>/<shardId>/<file>.tsm; a
    /// TSM file above that depth is an error.  The manifest is ordered by
    /// (database, retention policy, numeric shard id).
    fn walk_tsm_files(&self) -> anyhow::Result<Vec<ShardInfo>> {
        let mut shards: BTreeMap<(String, String, u64), ShardInfo> = BTreeMap::new();

        for entry in WalkDir::new(&self.config.data_dir) {
            let entry = entry.map_err(|e| anyhow!("walking data directory: {}", e))?;
            let path = entry.path();

            let Ok(rel) = path.strip_prefix(&self.config.data_dir) else {
                continue;
            };
            let comps: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();

            if entry.file_type().is_dir() {
                // Shard directories sit at depth 3; record them so shards
                // without any tsm files still show up in the manifest.
                if comps.len() == 3 {
                    if !self.matches_filters(&comps[0], &comps[1]) {
                        continue;
                    }
                    let Ok(shard_id) = comps[2].parse::<u64>() else {
                        warn!("ignoring non-shard directory {}", path.display());
                        continue;
                    };
                    shards
                        .entry((comps[0].clone(), comps[1].clone(), shard_id))
                        .or_insert_with(|| ShardInfo {
                            database: comps[0].clone(),
                            retention_policy: comps[1].clone(),
                            shard_id,
                            files: vec![],
                        });
                }
                continue;
            }

            // check to see if this is a tsm file
            if path.extension().and_then(|e| e.to_str()) != Some(TSM_FILE_EXTENSION) {
                continue;
            }

            if comps.len() < 4 {
                return Err(anyhow!("invalid directory structure for {}", path.display()));
            }

            let (db, rp) = (&comps[0], &comps[1]);
            if !self.matches_filters(db, rp) {
                continue;
            }
            let shard_id = comps[2]
                .parse::<u64>()
                .map_err(|_| anyhow!("invalid shard id in path {}", path.display()))?;

            shards
                .entry((db.clone(), rp.clone(), shard_id))
                .or_insert_with(|| ShardInfo {
                    database: db.clone(),
                    retention_policy: rp.clone(),
                    shard_id,
                    files: vec![],
                })
                .files
                .push(path.to_path_buf());
        }

        Ok(shards.into_values().collect())
    }

    fn matches_filters(&self, db: &str, rp: &str) -> bool {
        (self.config.database.is_empty() || db == self.config.database)
            && (self.config.retention_policy.is_empty() || rp == self.config.retention_policy)
    }
}
