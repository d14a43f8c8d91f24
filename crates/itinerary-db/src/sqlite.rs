use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use itinerary_common::{Error, Identifier, Result};
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params, params_from_iter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{Database, Executor};

/// Table holding one row per held lock. SQLite has no advisory locks, so a
/// row claimed with a conditional upsert stands in for one.
const LOCK_TABLE: &str = "_itinerary_lock";

const DEFAULT_LEASE: Duration = Duration::from_secs(300);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite session used as a migration target.
///
/// Locks are leases: a row in `_itinerary_lock` names the holding session and
/// an expiry. A crashed holder cannot release its row, so once the lease runs
/// out the next contender deletes it and takes over.
pub struct SqliteDatabase {
    conn: Connection,
    holder: String,
    lease: Duration,
}

impl SqliteDatabase {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening sqlite database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::from_connection(conn)
    }

    /// Wrap an already open connection. Sets WAL journaling and a busy timeout
    /// so concurrent sessions wait for each other instead of failing outright.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn,
            holder: Uuid::new_v4().to_string(),
            lease: DEFAULT_LEASE,
        })
    }

    /// How long a lock row survives a holder that never releases it.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn expires_at(&self, now: i64) -> i64 {
        now.saturating_add(i64::try_from(self.lease.as_secs()).unwrap_or(i64::MAX))
    }
}

impl Executor for SqliteDatabase {
    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        batch_execute(&self.conn, sql)
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64> {
        execute(&self.conn, sql, params)
    }

    fn query_i64(&mut self, sql: &str) -> Result<Vec<Option<i64>>> {
        query_i64(&self.conn, sql)
    }
}

impl Executor for rusqlite::Transaction<'_> {
    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        batch_execute(self, sql)
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64> {
        execute(self, sql, params)
    }

    fn query_i64(&mut self, sql: &str) -> Result<Vec<Option<i64>>> {
        query_i64(self, sql)
    }
}

impl Database for SqliteDatabase {
    fn try_advisory_lock(&mut self, key: i64) -> Result<bool> {
        let now = Utc::now().timestamp();
        let expires_at = self.expires_at(now);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sqlite_err)?;

        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {LOCK_TABLE} (
                lock_id INTEGER PRIMARY KEY,
                holder TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );"
        ))
        .map_err(sqlite_err)?;

        // Inherent call: `Executor` is also implemented for `Transaction`.
        let reclaimed = Connection::execute(
            &tx,
            &format!("DELETE FROM {LOCK_TABLE} WHERE lock_id = ?1 AND expires_at <= ?2"),
            params![key, now],
        )
        .map_err(sqlite_err)?;
        if reclaimed > 0 {
            warn!("sqlite lock {key}: reclaimed an expired lease");
        }

        // Claim a free row, or extend our own lease; a row owned by someone
        // else is left untouched.
        Connection::execute(
            &tx,
            &format!(
                "INSERT INTO {LOCK_TABLE} (lock_id, holder, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(lock_id) DO UPDATE SET expires_at = excluded.expires_at
                 WHERE holder = excluded.holder"
            ),
            params![key, self.holder, expires_at],
        )
        .map_err(sqlite_err)?;

        let holder: String = tx
            .query_row(
                &format!("SELECT holder FROM {LOCK_TABLE} WHERE lock_id = ?1"),
                params![key],
                |row| row.get(0),
            )
            .map_err(sqlite_err)?;
        tx.commit().map_err(sqlite_err)?;

        let acquired = holder == self.holder;
        debug!("sqlite lock {key}: acquired={acquired}");
        Ok(acquired)
    }

    /// Extends the lease only while the row still names this session. An
    /// expired row nobody has reclaimed yet is still ours.
    fn renew_advisory_lock(&mut self, key: i64) -> Result<bool> {
        let expires_at = self.expires_at(Utc::now().timestamp());
        let renewed = self
            .conn
            .execute(
                &format!(
                    "UPDATE {LOCK_TABLE} SET expires_at = ?1 WHERE lock_id = ?2 AND holder = ?3"
                ),
                params![expires_at, key, self.holder],
            )
            .map_err(sqlite_err)?;
        debug!("sqlite lock {key}: renewed={}", renewed == 1);
        Ok(renewed == 1)
    }

    fn advisory_unlock(&mut self, key: i64) -> Result<()> {
        let removed = self
            .conn
            .execute(
                &format!("DELETE FROM {LOCK_TABLE} WHERE lock_id = ?1 AND holder = ?2"),
                params![key, self.holder],
            )
            .map_err(sqlite_err)?;
        if removed == 0 {
            warn!("sqlite lock {key} was not held by this session");
        }
        Ok(())
    }

    fn table_exists(&mut self, table: &Identifier) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table.as_str()],
                |row| row.get(0),
            )
            .map_err(sqlite_err)?;
        Ok(count > 0)
    }

    fn transaction(
        &mut self,
        work: &mut dyn FnMut(&mut dyn Executor) -> Result<()>,
    ) -> Result<()> {
        let mut tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sqlite_err)?;

        match work(&mut tx) {
            Ok(()) => tx.commit().map_err(sqlite_err),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }
}

fn batch_execute(conn: &Connection, sql: &str) -> Result<()> {
    conn.execute_batch(sql).map_err(sqlite_err)
}

fn execute(conn: &Connection, sql: &str, params: &[i64]) -> Result<u64> {
    let affected = conn
        .execute(sql, params_from_iter(params.iter()))
        .map_err(sqlite_err)?;
    Ok(affected as u64)
}

fn query_i64(conn: &Connection, sql: &str) -> Result<Vec<Option<i64>>> {
    let mut stmt = conn.prepare(sql).map_err(sqlite_err)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, Option<i64>>(0))
        .map_err(sqlite_err)?;

    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(sqlite_err)?);
    }
    Ok(values)
}

/// Busy and locked databases clear up on their own, so they are reported as
/// transient.
fn sqlite_err(e: rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            Error::Connection(e.to_string())
        }
        _ => Error::Database(e.to_string()),
    }
}
