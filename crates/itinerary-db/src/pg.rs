use itinerary_common::{Error, Identifier, Result};
use postgres::types::ToSql;
use postgres::{Client, GenericClient, NoTls};
use tracing::{debug, info, warn};

use crate::database::{Database, Executor};

/// PostgreSQL session used as a migration target. Locking uses the native
/// session-level advisory lock functions, which the server releases by itself
/// when the session ends.
pub struct PostgresDatabase {
    client: Client,
}

impl PostgresDatabase {
    /// Connect without TLS. Use [`PostgresDatabase::from_client`] for anything
    /// fancier.
    pub fn connect(url: &str) -> Result<Self> {
        info!("connecting to postgres");
        let client = Client::connect(url, NoTls).map_err(pg_err)?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn into_inner(self) -> Client {
        self.client
    }
}

impl Executor for PostgresDatabase {
    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        batch_execute(&mut self.client, sql)
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64> {
        execute(&mut self.client, sql, params)
    }

    fn query_i64(&mut self, sql: &str) -> Result<Vec<Option<i64>>> {
        query_i64(&mut self.client, sql)
    }
}

impl Executor for postgres::Transaction<'_> {
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

impl Database for PostgresDatabase {
    fn try_advisory_lock(&mut self, key: i64) -> Result<bool> {
        let row = self
            .client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&key])
            .map_err(pg_err)?;
        let acquired: bool = row.try_get(0).map_err(pg_err)?;
        debug!("pg_try_advisory_lock({key}) = {acquired}");
        Ok(acquired)
    }

    /// Session locks cannot expire, so this only checks `pg_locks`. A bigint
    /// key is split across `classid` (high half) and `objid` (low half).
    fn renew_advisory_lock(&mut self, key: i64) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM pg_locks
                    WHERE locktype = 'advisory'
                      AND pid = pg_backend_pid()
                      AND granted
                      AND objsubid = 1
                      AND ((CAST(classid AS bigint) << 32) | CAST(objid AS bigint)) = $1
                )",
                &[&key],
            )
            .map_err(pg_err)?;
        let held: bool = row.try_get(0).map_err(pg_err)?;
        debug!("advisory lock {key} still held: {held}");
        Ok(held)
    }

    fn advisory_unlock(&mut self, key: i64) -> Result<()> {
        let row = self
            .client
            .query_one("SELECT pg_advisory_unlock($1)", &[&key])
            .map_err(pg_err)?;
        let released: bool = row.try_get(0).map_err(pg_err)?;
        if !released {
            warn!("advisory lock {key} was not held by this session");
        }
        Ok(())
    }

    fn table_exists(&mut self, table: &Identifier) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT to_regclass(CAST($1 AS text)) IS NOT NULL",
                &[&table.quoted()],
            )
            .map_err(pg_err)?;
        row.try_get(0).map_err(pg_err)
    }

    fn transaction(
        &mut self,
        work: &mut dyn FnMut(&mut dyn Executor) -> Result<()>,
    ) -> Result<()> {
        let mut tx = self.client.transaction().map_err(pg_err)?;

        match work(&mut tx) {
            Ok(()) => tx.commit().map_err(pg_err),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }
}

fn batch_execute<C: GenericClient>(client: &mut C, sql: &str) -> Result<()> {
    client.batch_execute(sql).map_err(pg_err)
}

fn execute<C: GenericClient>(client: &mut C, sql: &str, params: &[i64]) -> Result<u64> {
    let params: Vec<&(dyn ToSql + Sync)> = params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect();
    client.execute(sql, &params).map_err(pg_err)
}

fn query_i64<C: GenericClient>(client: &mut C, sql: &str) -> Result<Vec<Option<i64>>> {
    let rows = client.query(sql, &[]).map_err(pg_err)?;
    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        let value: Option<i64> = row.try_get(0).map_err(pg_err)?;
        values.push(value);
    }
    Ok(values)
}

/// Lost connections, SQLSTATE class 08 and server shutdown states are worth
/// retrying; everything else is reported as a plain database error.
fn pg_err(e: postgres::Error) -> Error {
    let sqlstate = e.code().map(|state| state.code().to_string());
    let io_failure = std::error::Error::source(&e).is_some_and(|s| s.is::<std::io::Error>());

    if e.is_closed() || io_failure || sqlstate.as_deref().is_some_and(is_transient_sqlstate) {
        Error::Connection(e.to_string())
    } else {
        Error::Database(e.to_string())
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}
