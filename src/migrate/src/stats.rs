use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicU64;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use std::collections::BTreeMap;

const CACHE_ENTRIES: usize = 1000;

/// StatInfo accumulates per-shard statistics.  Instances are pooled and
/// reused across shards.
#[derive(Default)]
pub struct StatInfo {
    pub rows_read: usize,
    pub tags_read: HashSet<String>,
    pub fields_read: HashSet<String>,
}

impl StatInfo {
    pub fn reset(&mut self) {
        self.rows_read = 0;
        self.tags_read.clear();
        self.fields_read.clear();
    }
}

/// GlobalStats aggregates progress across all workers.  The sets are
/// sharded concurrent maps so workers never contend on one lock.
#[derive(Default)]
pub struct GlobalStats {
    pub tags_total: DashMap<String, ()>,
    pub field_total: DashMap<String, ()>,
    pub rows_migrated: AtomicU64,
    pub shards_done: AtomicU64,
}

/// Pool hands out reusable objects.  Returning an object is optional;
/// correctness never depends on pool identity.
pub struct Pool<T: Send> {
    items: Mutex<Vec<T>>,
    make: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Send> Pool<T> {
    pub fn new(make: Box<dyn Fn() -> T + Send + Sync>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            make,
        }
    }

    pub fn get(&self) -> T {
        self.items.lock().pop().unwrap_or_else(|| (self.make)())
    }

    pub fn put(&self, item: T) {
        self.items.lock().push(item);
    }
}

pub type MeasurementCache = LruCache<Vec<u8>, String>;
pub type TagsCache = LruCache<Vec<u8>, BTreeMap<String, String>>;

lazy_static! {
    /// Per-shard scratch pools, mirroring the engine's reuse of stat
    /// structs and parse caches across shard migrations.
    pub static ref STAT_POOL: Pool<StatInfo> = Pool::new(Box::new(StatInfo::default));
    pub static ref MEASUREMENT_CACHE_POOL: Pool<MeasurementCache> = Pool::new(Box::new(|| {
        LruCache::new(NonZeroUsize::new(CACHE_ENTRIES).unwrap())
    }));
    pub static ref TAGS_CACHE_POOL: Pool<TagsCache> = Pool::new(Box::new(|| {
        LruCache::new(NonZeroUsize::new(CACHE_ENTRIES).unwrap())
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuse() {
        let pool: Pool<Vec<u8>> = Pool::new(Box::new(Vec::new));
        let mut v = pool.get();
        v.push(1);
        pool.put(v);

        let v = pool.get();
        // pooled objects keep their contents; callers reset what they need
        assert_eq!(v, vec![1]);
        assert!(pool.get().is_empty());
    }

    #[test]
    fn test_stat_reset() {
        let mut stat = StatInfo::default();
        stat.rows_read = 10;
        stat.tags_read.insert("cpu,host".to_string());
        stat.reset();
        assert_eq!(stat.rows_read, 0);
        assert!(stat.tags_read.is_empty());
    }
}
