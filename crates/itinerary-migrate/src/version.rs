use itinerary_common::{Error, Identifier, Result};
use itinerary_db::{Database, Executor};
use tracing::{debug, info};

/// The single-row table recording the id of the last applied migration.
///
/// Statements are plain SQL accepted by both PostgreSQL and SQLite; the table
/// name is always spliced in through [`Identifier`]'s quoted form.
#[derive(Debug, Clone)]
pub struct VersionStore {
    table: Identifier,
}

impl VersionStore {
    pub fn new(table: Identifier) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Identifier {
        &self.table
    }

    /// Create the table if it is missing. Must run outside a transaction so
    /// it commits on its own.
    pub fn ensure_table<E: Executor + ?Sized>(&self, db: &mut E) -> Result<()> {
        db.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (version integer)",
            self.table
        ))
    }

    /// Current version. An empty table is bootstrapped with a `0` row.
    pub fn read_version<E: Executor + ?Sized>(&self, db: &mut E) -> Result<i64> {
        match self.stored_version(db)? {
            Some(version) => Ok(version),
            None => {
                db.execute(
                    &format!("INSERT INTO {} (version) VALUES (0)", self.table),
                    &[],
                )?;
                info!("initialized version table {}", self.table);
                Ok(0)
            }
        }
    }

    /// Current version without writing anything: a missing table or an empty
    /// one reads as `0`.
    pub fn peek_version<D: Database + ?Sized>(&self, db: &mut D) -> Result<i64> {
        if !db.table_exists(&self.table)? {
            debug!("version table {} does not exist yet", self.table);
            return Ok(0);
        }
        Ok(self.stored_version(db)?.unwrap_or(0))
    }

    /// `None` for an empty table.
    fn stored_version<E: Executor + ?Sized>(&self, db: &mut E) -> Result<Option<i64>> {
        let rows = db.query_i64(&format!(
            "SELECT CAST(version AS BIGINT) FROM {}",
            self.table
        ))?;

        match rows.as_slice() {
            [] => Ok(None),
            [Some(version)] => {
                debug!("version table {} at {version}", self.table);
                Ok(Some(*version))
            }
            [None] => Err(self.corrupt("version is NULL".into())),
            _ => Err(self.corrupt(format!("expected one row, found {}", rows.len()))),
        }
    }

    /// Set the version to `id`. Belongs in the same transaction as the
    /// migration it records.
    pub fn advance<E: Executor + ?Sized>(&self, db: &mut E, id: i64) -> Result<()> {
        let updated = db.execute(
            &format!("UPDATE {} SET version = CAST($1 AS BIGINT)", self.table),
            &[id],
        )?;
        if updated != 1 {
            return Err(self.corrupt(format!("expected to update one row, updated {updated}")));
        }
        Ok(())
    }

    fn corrupt(&self, detail: String) -> Error {
        Error::CorruptVersionState {
            table: self.table.as_str().to_string(),
            detail,
        }
    }
}
