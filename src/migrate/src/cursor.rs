use std::sync::Arc;

use log::{debug, error};

use crate::options::TombstoneEndpoints;
use migrate_tsdb::engine::tsm1::file_store::index::IndexEntry;
use migrate_tsdb::engine::tsm1::file_store::reader::TsmReader;
use migrate_tsdb::engine::tsm1::file_store::TimeRange;
use migrate_tsdb::engine::tsm1::value::FieldValue;

/// Location is one planned block read: a file, a block entry, and the
/// watermark of the largest timestamp already drained from the block.
pub struct Location {
    pub reader: Arc<TsmReader>,
    pub entry: IndexEntry,
    pub read_max: i64,
}

/// plan_locations computes the block reads covering a time window for one
/// composite key across all open readers.  Blocks fully covered by a
/// tombstone and blocks outside the window are dropped; the returned list
/// is unordered.
pub fn plan_locations(
    files: &[Arc<TsmReader>],
    key: &[u8],
    st: i64,
    et: i64,
) -> Vec<Location> {
    let mut locations = Vec::new();

    for fd in files {
        let tombstones = fd.tombstone_range(key);
        let entries = fd.read_entries(key);

        'entries: for ie in entries {
            // Skip blocks that only contain values that are tombstoned.
            for t in tombstones {
                if t.min <= ie.min_time && t.max >= ie.max_time {
                    continue 'entries;
                }
            }

            // Skip blocks entirely outside the window.
            if ie.max_time < st {
                continue;
            }
            if ie.min_time > et {
                continue;
            }

            // Mark everything before the seek time as read so it is
            // filtered out at scan time.  The checked_sub guards the
            // i64::MIN underflow.
            let read_max = st.checked_sub(1).unwrap_or(st);

            locations.push(Location {
                reader: fd.clone(),
                entry: *ie,
                read_max,
            });
        }
    }

    locations
}

/// Cursor iterates one series/field in ascending timestamp order across a
/// set of possibly overlapping block locations.  The per-location read_max
/// watermark records the largest timestamp already emitted from each block
/// so overlapping files never double count.
pub struct Cursor {
    et: i64,
    read_ts: i64,
    key: Vec<u8>,
    /// seeks is all the file locations that we need to return during iteration.
    seeks: Vec<Location>,
    buf: Vec<FieldValue>,
    pos: usize,
    endpoints: TombstoneEndpoints,
}

impl Cursor {
    pub fn new(
        key: Vec<u8>,
        et: i64,
        seeks: Vec<Location>,
        endpoints: TombstoneEndpoints,
    ) -> Self {
        Self {
            et,
            read_ts: 0,
            key,
            seeks,
            buf: Vec::new(),
            pos: 0,
            endpoints,
        }
    }

    /// init orders the locations, normalizes their watermarks and primes
    /// the buffer with the first block read.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        if self.seeks.is_empty() {
            self.buf.clear();
            self.pos = 0;
            return Ok(());
        }

        self.seeks.sort_by_key(|l| l.entry.min_time);
        for l in &mut self.seeks {
            if l.read_max < l.entry.min_time.saturating_sub(1) {
                l.read_max = l.entry.min_time.saturating_sub(1);
            }
        }
        self.read_ts = self.seeks[0].read_max;

        if log::log_enabled!(log::Level::Debug) {
            for i in 1..self.seeks.len() {
                if self.seeks[i].read_max < self.seeks[i - 1].read_max {
                    debug!("Cursor.init: found read_max not in right order");
                }
            }
        }

        self.buf = self.read_block().await?;
        self.pos = 0;
        Ok(())
    }

    /// read_block drains the next frontier of locations.  All locations
    /// whose watermark sits at read_ts contribute values up to an upper
    /// bound below which their ordering is authoritative against the
    /// remaining locations.
    async fn read_block(&mut self) -> anyhow::Result<Vec<FieldValue>> {
        loop {
            // No matching blocks to decode
            if self.seeks.is_empty() || self.read_ts >= self.et {
                return Ok(Vec::new());
            }

            if log::log_enabled!(log::Level::Debug) && self.read_ts > self.seeks[0].read_max {
                debug!("Cursor.read_block: read_ts > seeks[0].read_max");
            }

            // The locations to read this round: the first plus every other
            // location whose watermark is at the current frontier.
            let mut selected = vec![0_usize];
            for i in 1..self.seeks.len() {
                if self.seeks[i].read_max == self.read_ts {
                    selected.push(i);
                }
            }

            // The timestamp range to read this round is
            // (read_ts, upper_bound].
            let mut upper_bound = self.et;
            for &i in &selected {
                if self.seeks[i].entry.max_time < upper_bound {
                    upper_bound = self.seeks[i].entry.max_time;
                }
            }
            if self.seeks.len() > selected.len() {
                let next_round_start = self.seeks[selected.len()].read_max;
                if next_round_start <= upper_bound {
                    upper_bound = next_round_start;
                }
            }

            // This should not happen
            if upper_bound <= self.read_ts {
                error!("Cursor.read_block: found upper_bound <= read_ts");
                self.recover();
                continue;
            }

            let mut buf: Vec<FieldValue> = Vec::new();

            for &i in &selected {
                let reader = self.seeks[i].reader.clone();
                let entry = self.seeks[i].entry;
                let tombstones: Vec<TimeRange> = reader.tombstone_range(&self.key).to_vec();

                let values = reader
                    .read_at(&entry)
                    .await
                    .map_err(|e| {
                        error!("Read block failed: {}", e);
                        e
                    })?
                    .into_field_values();

                for v in values {
                    let ts = v.unix_nano();
                    if ts <= self.read_ts {
                        continue;
                    }
                    if ts > upper_bound {
                        break;
                    }
                    if tombstones.iter().any(|t| self.deleted(ts, t)) {
                        continue;
                    }
                    buf.push(v);
                }

                self.seeks[i].read_max = upper_bound;
            }

            // Drop the locations that finished reading
            let et = self.et;
            self.seeks
                .retain(|l| !(l.read_max >= et || l.read_max >= l.entry.max_time));

            // Mark the time range that has been read
            let prev_read_ts = self.read_ts;
            self.read_ts = upper_bound;

            if buf.is_empty() {
                debug!(
                    "Cursor.read_block: empty buffer with {} locations read, read_ts {}, upper_bound {}",
                    selected.len(),
                    prev_read_ts,
                    upper_bound
                );
                continue;
            }

            return Ok(sort_and_deduplicate(buf));
        }
    }

    /// recover repairs an inconsistent location set: re-sort by watermark,
    /// clamp watermarks that fell behind the frontier and drop exhausted
    /// locations.
    fn recover(&mut self) {
        self.seeks.sort_by_key(|l| l.read_max);

        let read_ts = self.read_ts;
        for l in &mut self.seeks {
            if l.read_max < read_ts {
                debug!("Cursor.read_block: found read_max < read_ts");
                l.read_max = read_ts;
            }
        }

        let et = self.et;
        self.seeks
            .retain(|l| !(l.read_max >= et || l.read_max >= l.entry.max_time));
    }

    fn deleted(&self, ts: i64, t: &TimeRange) -> bool {
        match self.endpoints {
            // A value exactly at a tombstone boundary survives.
            TombstoneEndpoints::StrictOpen => ts > t.min && ts < t.max,
            TombstoneEndpoints::Closed => ts >= t.min && ts <= t.max,
        }
    }

    /// peek_ts returns the timestamp of the next value without consuming it.
    pub async fn peek_ts(&mut self) -> anyhow::Result<Option<i64>> {
        loop {
            if self.pos < self.buf.len() {
                return Ok(Some(self.buf[self.pos].unix_nano()));
            }
            let buf = self.read_block().await?;
            if buf.is_empty() {
                return Ok(None);
            }
            self.buf = buf;
            self.pos = 0;
        }
    }

    /// next consumes and returns the next value.
    pub async fn next(&mut self) -> anyhow::Result<Option<FieldValue>> {
        if self.peek_ts().await?.is_none() {
            return Ok(None);
        }
        let v = self.buf[self.pos].clone();
        self.pos += 1;
        Ok(Some(v))
    }
}

/// sort_and_deduplicate stable-sorts by timestamp and collapses runs of
/// equal timestamps keeping the last occurrence.
fn sort_and_deduplicate(mut buf: Vec<FieldValue>) -> Vec<FieldValue> {
    if buf.len() <= 1 {
        return buf;
    }

    buf.sort_by_key(|v| v.unix_nano());

    let mut i = 0;
    for j in 1..buf.len() {
        if buf[j].unix_nano() != buf[i].unix_nano() {
            i += 1;
        }
        if i != j {
            buf.swap(i, j);
        }
    }
    buf.truncate(i + 1);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(ts: i64, v: f64) -> FieldValue {
        FieldValue::Float {
            unix_nano: ts,
            value: v,
        }
    }

    #[test]
    fn test_sort_and_deduplicate_keeps_last() {
        let buf = vec![fv(2, 1.0), fv(1, 2.0), fv(2, 3.0), fv(1, 4.0)];
        let got = sort_and_deduplicate(buf);
        assert_eq!(got, vec![fv(1, 4.0), fv(2, 3.0)]);
    }

    #[test]
    fn test_sort_and_deduplicate_sorted_input() {
        let buf = vec![fv(1, 1.0), fv(2, 2.0), fv(3, 3.0)];
        let got = sort_and_deduplicate(buf.clone());
        assert_eq!(got, buf);
    }
}
