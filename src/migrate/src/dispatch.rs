use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{error, info};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::migrator::Migrator;
use crate::options::MigrateConfig;
use crate::shard::ShardGroup;
use crate::stats::GlobalStats;

/// run_groups fans shard groups out to a fixed pool of workers, one per
/// logical CPU.  The first worker error cancels the run; workers observe
/// the cancellation between shards and the first error is returned once
/// every worker has drained.
pub async fn run_groups(
    groups: Vec<ShardGroup>,
    config: Arc<MigrateConfig>,
    gstat: Arc<GlobalStats>,
) -> anyhow::Result<()> {
    let (tx, rx) = async_channel::bounded::<ShardGroup>(1);
    let token = CancellationToken::new();
    let first_err: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

    let worker_count = num_cpus::get().max(1);
    let mut workers = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let rx = rx.clone();
        let token = token.clone();
        let first_err = first_err.clone();
        let config = config.clone();
        let gstat = gstat.clone();

        workers.push(tokio::spawn(async move {
            worker(id, rx, token, first_err, config, gstat).await;
        }));
    }
    drop(rx);

    // Feed groups in manifest order; stop early once a worker failed.
    for group in groups {
        tokio::select! {
            _ = token.cancelled() => break,
            sent = tx.send(group) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    drop(tx);

    for w in workers {
        w.await
            .map_err(|e| anyhow!("worker panicked: {}", e))?;
    }

    let err = first_err.lock().take();
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn worker(
    id: usize,
    rx: async_channel::Receiver<ShardGroup>,
    token: CancellationToken,
    first_err: Arc<Mutex<Option<anyhow::Error>>>,
    config: Arc<MigrateConfig>,
    gstat: Arc<GlobalStats>,
) {
    while let Ok(group) = rx.recv().await {
        for shard in group.shards {
            // Cancellation is observed between shards, never mid-shard.
            if token.is_cancelled() {
                return;
            }

            info!(
                "worker {}: migrating shard {}/{}/{} ({} files)",
                id,
                shard.database,
                shard.retention_policy,
                shard.shard_id,
                shard.files.len()
            );

            let mut migrator = Migrator::new(config.clone(), shard.database.clone(), gstat.clone());
            match migrator.migrate_tsm_files(shard.files).await {
                Ok(()) => {
                    let stat = migrator.stat();
                    info!(
                        "worker {}: shard {}/{}/{} done: {} rows, {} tags, {} fields",
                        id,
                        shard.database,
                        shard.retention_policy,
                        shard.shard_id,
                        stat.rows_read,
                        stat.tags_read.len(),
                        stat.fields_read.len()
                    );
                    gstat.shards_done.fetch_add(1, Ordering::Relaxed);
                    migrator.release();
                }
                Err(e) => {
                    error!(
                        "worker {}: shard {}/{}/{} failed: {}",
                        id, shard.database, shard.retention_policy, shard.shard_id, e
                    );
                    migrator.release();

                    let mut slot = first_err.lock();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    drop(slot);

                    token.cancel();
                    return;
                }
            }
        }
    }
}
