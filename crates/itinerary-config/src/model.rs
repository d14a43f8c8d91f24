use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `postgres://...`, `postgresql://...`, `sqlite://<path>` or `sqlite::memory:`.
    pub database_url: Option<String>,
    pub migrations: MigrationConfig,
}

/// Settings for one migration run. Every field has a default so an empty file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Advisory lock key. Separate migration sets sharing a database need
    /// distinct ids.
    pub lock_id: i64,
    /// Directory holding `<id>_<description>` scripts.
    pub path: PathBuf,
    /// Name of the single-row version table.
    pub version_table: String,
    /// Delay between lock attempts while another process holds the lock.
    pub retry_interval_ms: u64,
    /// SQLite only: how long a lock row stays valid if its holder disappears.
    pub sqlite_lease_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_id: 0,
            path: PathBuf::from("migrations"),
            version_table: "_version".to_string(),
            retry_interval_ms: 1000,
            sqlite_lease_secs: 300,
        }
    }
}

impl MigrationConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn sqlite_lease(&self) -> Duration {
        Duration::from_secs(self.sqlite_lease_secs)
    }
}
