use itinerary_common::{Identifier, Result};

/// Statement execution against one database session, either in autocommit
/// mode or inside a transaction opened by [`Database::transaction`].
pub trait Executor {
    /// Run one or more `;`-separated statements without parameters.
    fn batch_execute(&mut self, sql: &str) -> Result<()>;

    /// Run a single statement with positional (`$1`, `$2`, ...) integer
    /// parameters. Returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64>;

    /// Run a query and collect its first column as nullable integers.
    fn query_i64(&mut self, sql: &str) -> Result<Vec<Option<i64>>>;
}

/// A database session that can serialize work across processes and run
/// closures inside a transaction.
pub trait Database: Executor {
    /// Try to take the session-scoped lock `key` without blocking. `Ok(false)`
    /// means another session holds it.
    fn try_advisory_lock(&mut self, key: i64) -> Result<bool>;

    /// Confirm this session still holds `key` and push back any expiry.
    /// `Ok(false)` means the lock was lost to another session.
    fn renew_advisory_lock(&mut self, key: i64) -> Result<bool>;

    /// Release a lock taken by [`Database::try_advisory_lock`].
    fn advisory_unlock(&mut self, key: i64) -> Result<()>;

    /// Whether a table named `table` is visible to this session, without
    /// creating anything.
    fn table_exists(&mut self, table: &Identifier) -> Result<bool>;

    /// Run `work` in a transaction: commit if it returns `Ok`, roll back and
    /// return its error otherwise.
    fn transaction(
        &mut self,
        work: &mut dyn FnMut(&mut dyn Executor) -> Result<()>,
    ) -> Result<()>;
}
