use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::atomic::Ordering;

use log::error;

use crate::cursor::Cursor;
use crate::gemini::GeminiClient;
use crate::options::MigrateConfig;
use crate::point::Point;
use crate::stats::{GlobalStats, StatInfo};

/// Scanner merges the per-field cursors of one series into multi-field
/// points, one per distinct timestamp, and feeds them to the batch writer.
pub struct Scanner {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: Vec<(String, Cursor)>,

    /// Min-heap over (peek timestamp, field index).  Entries go stale when
    /// cursors advance and are repaired lazily on pop.
    heap: BinaryHeap<Reverse<(i64, usize)>>,
}

impl Scanner {
    /// new seeds the merge heap from the already initialized cursors.
    pub async fn new(
        measurement: String,
        tags: BTreeMap<String, String>,
        mut fields: Vec<(String, Cursor)>,
    ) -> anyhow::Result<Self> {
        let mut heap = BinaryHeap::with_capacity(fields.len());
        for (i, (_, cursor)) in fields.iter_mut().enumerate() {
            if let Some(ts) = cursor.peek_ts().await? {
                heap.push(Reverse((ts, i)));
            }
        }

        Ok(Self {
            measurement,
            tags,
            fields,
            heap,
        })
    }

    /// next_point determines the merge frontier and assembles one point
    /// from every field cursor sitting on it.  Returns None once all
    /// cursors are exhausted.
    async fn next_point(
        &mut self,
        stat: &mut StatInfo,
        gstat: &GlobalStats,
    ) -> anyhow::Result<Option<Point>> {
        let cur_ts = loop {
            let Some(Reverse((ts, i))) = self.heap.pop() else {
                return Ok(None);
            };
            match self.fields[i].1.peek_ts().await? {
                // exhausted cursors leave the merge for good
                None => continue,
                Some(actual) if actual == ts => {
                    self.heap.push(Reverse((ts, i)));
                    break ts;
                }
                // stale entry: reinsert at its real position
                Some(actual) => {
                    self.heap.push(Reverse((actual, i)));
                }
            }
        };

        let mut fields = Vec::new();
        for (name, cursor) in self.fields.iter_mut() {
            if cursor.peek_ts().await? == Some(cur_ts) {
                if let Some(v) = cursor.next().await? {
                    fields.push((name.clone(), v));
                }
            }
        }

        // statistics
        for t in self.tags.keys() {
            stat.tags_read.insert(format!("{}{}", self.measurement, t));
            gstat
                .tags_total
                .insert(format!("{}{}", self.measurement, t), ());
        }
        for (f, _) in &fields {
            stat.fields_read.insert(format!("{}{}", self.measurement, f));
            gstat
                .field_total
                .insert(format!("{}{}", self.measurement, f), ());
        }

        Ok(Some(Point {
            measurement: self.measurement.clone(),
            tags: self.tags.clone(),
            fields,
            unix_nano: cur_ts,
        }))
    }

    /// write_batches pulls points from the merge and posts them in batches
    /// of config.batch_size; the terminal partial batch is flushed when the
    /// scanner is exhausted.
    pub async fn write_batches(
        &mut self,
        client: &GeminiClient,
        db: &str,
        config: &MigrateConfig,
        stat: &mut StatInfo,
        gstat: &GlobalStats,
    ) -> anyhow::Result<()> {
        let mut lines = String::new();
        let mut count = 0_usize;

        loop {
            let pt = self.next_point(stat, gstat).await.map_err(|e| {
                error!("point read error: {}", e);
                e
            })?;

            let Some(pt) = pt else {
                if count > 0 {
                    retry_write(client, db, &lines, config).await?;
                    stat.rows_read += count;
                    gstat.rows_migrated.fetch_add(count as u64, Ordering::Relaxed);
                }
                return Ok(());
            };

            if !lines.is_empty() {
                lines.push('\n');
            }
            pt.write_line(&mut lines);
            count += 1;

            if count == config.batch_size {
                retry_write(client, db, &lines, config).await?;
                stat.rows_read += count;
                gstat.rows_migrated.fetch_add(count as u64, Ordering::Relaxed);
                lines.clear();
                count = 0;
            }
        }
    }
}

/// retry_write posts one batch, retrying on failure.  With
/// max_write_retries == 0 it retries the same batch until the write
/// succeeds; the destination is expected to deduplicate replays.
async fn retry_write(
    client: &GeminiClient,
    db: &str,
    lines: &str,
    config: &MigrateConfig,
) -> anyhow::Result<()> {
    let mut attempts = 0_usize;

    loop {
        match client.write_batch(db, lines.to_string()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                error!("insert error: {}", e);
                if let Some(first) = lines.lines().next() {
                    error!("retry for points like: {}", first);
                }

                attempts += 1;
                if config.max_write_retries > 0 && attempts >= config.max_write_retries {
                    return Err(anyhow!("write failed after {} attempts: {}", attempts, e));
                }

                tokio::time::sleep(config.retry_interval).await;
            }
        }
    }
}
