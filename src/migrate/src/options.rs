use std::path::PathBuf;
use std::time::Duration;

use migrate_utils::time::parse_rfc3339;

/// TombstoneEndpoints selects how a value lying exactly on a tombstone
/// boundary is treated.  StrictOpen keeps boundary values, mirroring the
/// engine's per-value comparison; Closed drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneEndpoints {
    StrictOpen,
    Closed,
}

/// DataMigrateOptions carries the raw command line flags.
#[derive(Debug, Clone)]
pub struct DataMigrateOptions {
    pub data_dir: String,
    pub out: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub dest_database: String,
    pub retention_policy: String,
    pub start: String,
    pub end: String,
    pub batch_size: usize,
    pub ssl: bool,
    pub unsafe_ssl: bool,
    pub debug: bool,

    pub retry_interval_secs: u64,
    pub max_write_retries: usize,
}

impl Default for DataMigrateOptions {
    fn default() -> Self {
        Self {
            data_dir: "/var/lib/influxdb/data".to_string(),
            out: "127.0.0.1:8086".to_string(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            dest_database: String::new(),
            retention_policy: String::new(),
            start: String::new(),
            end: String::new(),
            batch_size: 1000,
            ssl: false,
            unsafe_ssl: false,
            debug: false,
            retry_interval_secs: 3,
            max_write_retries: 0,
        }
    }
}

impl DataMigrateOptions {
    /// resolve validates the flags and produces the runtime configuration.
    pub fn resolve(self) -> anyhow::Result<MigrateConfig> {
        if !self.retention_policy.is_empty() && self.database.is_empty() {
            return Err(anyhow!("must specify a db"));
        }

        let start_time = if self.start.is_empty() {
            i64::MIN
        } else {
            parse_rfc3339(&self.start)?
        };
        let end_time = if self.end.is_empty() {
            i64::MAX
        } else {
            parse_rfc3339(&self.end)?
        };

        if end_time < start_time {
            return Err(anyhow!("end time before start time"));
        }

        if self.batch_size == 0 {
            return Err(anyhow!("batch size must be greater than zero"));
        }

        let dest_database = if self.dest_database.is_empty() {
            self.database.clone()
        } else {
            self.dest_database.clone()
        };

        Ok(MigrateConfig {
            data_dir: PathBuf::from(self.data_dir),
            out: self.out,
            username: self.username,
            password: self.password,
            database: self.database,
            dest_database,
            retention_policy: self.retention_policy,
            start_time,
            end_time,
            batch_size: self.batch_size,
            ssl: self.ssl,
            unsafe_ssl: self.unsafe_ssl,
            debug: self.debug,
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            max_write_retries: self.max_write_retries,
            tombstone_endpoints: TombstoneEndpoints::StrictOpen,
        })
    }
}

/// MigrateConfig is the validated runtime configuration shared by every
/// worker.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub data_dir: PathBuf,
    pub out: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub dest_database: String,
    pub retention_policy: String,
    pub start_time: i64,
    pub end_time: i64,
    pub batch_size: usize,
    pub ssl: bool,
    pub unsafe_ssl: bool,
    pub debug: bool,

    /// How long to wait between write retries.
    pub retry_interval: Duration,
    /// 0 retries the same batch forever.
    pub max_write_retries: usize,

    pub tombstone_endpoints: TombstoneEndpoints,
}

impl MigrateConfig {
    /// dest_db returns the destination database for a shard read from
    /// source_db.  With no explicit destination every shard lands in a
    /// database named after its source.
    pub fn dest_db<'a>(&'a self, source_db: &'a str) -> &'a str {
        if self.dest_database.is_empty() {
            source_db
        } else {
            &self.dest_database
        }
    }
}
