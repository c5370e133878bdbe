use std::path::PathBuf;

use log::warn;

use migrate_tsdb::engine::tsm1::file_store::reader::TsmReader;

/// ShardInfo is one manifest entry: a shard directory and its TSM files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub database: String,
    pub retention_policy: String,
    pub shard_id: u64,
    pub files: Vec<PathBuf>,
}

/// ShardGroup covers the half-open interval [min, max) of one database and
/// retention policy; a shard belongs to the group containing the minimum
/// timestamp of its files.
#[derive(Debug)]
pub struct ShardGroup {
    pub database: String,
    pub retention_policy: String,
    pub shards: Vec<ShardInfo>,
    pub min: i64,
    pub max: i64,
}

impl ShardGroup {
    fn contains(&self, db: &str, rp: &str, ts: i64) -> bool {
        self.database == db && self.retention_policy == rp && self.min <= ts && ts < self.max
    }
}

/// group_start truncates a timestamp down to a multiple of the shard group
/// duration.
fn group_start(ts: i64, duration: i64) -> i64 {
    ts - ts.rem_euclid(duration)
}

/// build_shard_groups walks the manifest in order and buckets each shard
/// into the group covering its minimum timestamp, creating groups of the
/// given duration as needed.  Shards with no files or an unreadable first
/// file are skipped with a warning.
pub async fn build_shard_groups(
    manifest: Vec<ShardInfo>,
    duration: i64,
) -> anyhow::Result<Vec<ShardGroup>> {
    let mut groups: Vec<ShardGroup> = Vec::new();

    for shard in manifest {
        if shard.files.is_empty() {
            warn!(
                "shard {}/{}/{} has no tsm files, skipped",
                shard.database, shard.retention_policy, shard.shard_id
            );
            continue;
        }

        let Some(min_ts) = peek_min_time(&shard).await else {
            continue;
        };

        match groups
            .iter_mut()
            .find(|g| g.contains(&shard.database, &shard.retention_policy, min_ts))
        {
            Some(group) => group.shards.push(shard),
            None => {
                let (min, max) = if duration > 0 {
                    let min = group_start(min_ts, duration);
                    (min, min.checked_add(duration).unwrap_or(i64::MAX))
                } else {
                    // A destination without a shard group duration gets one
                    // unbounded group per shard run.
                    (i64::MIN, i64::MAX)
                };
                groups.push(ShardGroup {
                    database: shard.database.clone(),
                    retention_policy: shard.retention_policy.clone(),
                    shards: vec![shard],
                    min,
                    max,
                });
            }
        }
    }

    Ok(groups)
}

/// peek_min_time reads the minimum timestamp of a shard: the time range of
/// its lexicographically first file.
async fn peek_min_time(shard: &ShardInfo) -> Option<i64> {
    let first = shard.files.iter().min()?;
    match TsmReader::open(first).await {
        Ok(r) => Some(r.time_range().min),
        Err(e) => {
            warn!(
                "shard {}/{}/{}: unable to read {}, skipped: {}",
                shard.database,
                shard.retention_policy,
                shard.shard_id,
                first.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_start() {
        assert_eq!(group_start(0, 100), 0);
        assert_eq!(group_start(99, 100), 0);
        assert_eq!(group_start(100, 100), 100);
        assert_eq!(group_start(250, 100), 200);
        // negative timestamps truncate downwards
        assert_eq!(group_start(-1, 100), -100);
        assert_eq!(group_start(-100, 100), -100);
    }

    #[tokio::test]
    async fn test_empty_shard_skipped() {
        let manifest = vec![ShardInfo {
            database: "db".to_string(),
            retention_policy: "rp".to_string(),
            shard_id: 1,
            files: vec![],
        }];
        let groups = build_shard_groups(manifest, 1000).await.unwrap();
        assert!(groups.is_empty());
    }
}
