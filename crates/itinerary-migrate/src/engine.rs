use std::ops::Bound::{Excluded, Unbounded};
use std::time::Duration;

use itinerary_common::{Error, Identifier, Result};
use itinerary_config::MigrationConfig;
use itinerary_db::Database;
use tracing::info;

use crate::lock::AdvisoryLock;
use crate::observer::{MigrationObserver, TracingObserver};
use crate::source::{DirectorySource, MigrationSource, discover};
use crate::version::VersionStore;

/// Validated, immutable settings for a [`Migrator`].
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub lock_id: i64,
    pub version_table: Identifier,
    pub retry_interval: Duration,
}

impl MigrationSettings {
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            lock_id: config.lock_id,
            version_table: Identifier::new(config.version_table.clone())?,
            retry_interval: config.retry_interval(),
        })
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    /// `(id, name)` of each script applied, in order.
    pub applied: Vec<(i64, String)>,
}

/// Applies the scripts of a [`MigrationSource`] to a database.
pub struct Migrator<S> {
    source: S,
    settings: MigrationSettings,
    observer: Box<dyn MigrationObserver + Send + Sync>,
}

impl Migrator<DirectorySource> {
    /// Scripts from `config.path`, settings from the rest of `config`.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        let settings = MigrationSettings::from_config(config)?;
        Ok(Self::new(DirectorySource::new(&config.path), settings))
    }
}

impl<S: MigrationSource> Migrator<S> {
    pub fn new(source: S, settings: MigrationSettings) -> Self {
        Self {
            source,
            settings,
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl MigrationObserver + Send + Sync + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Apply every script with an id above the stored version, in ascending
    /// order, each in its own transaction together with the version bump.
    ///
    /// The whole run happens under the advisory lock, which is released on
    /// every exit path. The first failing script rolls back its transaction
    /// and ends the run; scripts committed before it stay applied.
    pub fn migrate<D: Database + ?Sized>(&self, db: &mut D) -> Result<MigrationReport> {
        let store = self.version_store();
        let mut db = self.lock().acquire(db, self.observer.as_ref())?;

        let migrations = discover(&self.source)?;
        store.ensure_table(&mut *db)?;
        let from_version = store.read_version(&mut *db)?;
        info!(
            "{} migrations found, database at version {from_version}",
            migrations.len()
        );

        let mut report = MigrationReport {
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        };

        for script in migrations.range((Excluded(from_version), Unbounded)).map(|(_, s)| s) {
            // A lease may have run out during earlier scripts.
            db.renew()?;
            self.observer.applying(script);

            db.transaction(&mut |tx| {
                tx.batch_execute(&script.body)?;
                store.advance(tx, script.id)
            })
            .map_err(|source| Error::MigrationFailed {
                id: script.id,
                name: script.name.clone(),
                source: Box::new(source),
            })?;

            self.observer.applied(script);
            report.to_version = script.id;
            report.applied.push((script.id, script.name.clone()));
        }

        self.observer.finished(&report);
        Ok(report)
    }

    /// The stored version, or 0 if nothing has been applied yet. Read-only:
    /// takes no lock and never creates the version table.
    pub fn current_version<D: Database + ?Sized>(&self, db: &mut D) -> Result<i64> {
        self.version_store().peek_version(db)
    }

    fn lock(&self) -> AdvisoryLock {
        AdvisoryLock::new(self.settings.lock_id, self.settings.retry_interval)
    }

    fn version_store(&self) -> VersionStore {
        VersionStore::new(self.settings.version_table.clone())
    }
}

/// Run all pending migrations described by `config` against `db`.
pub fn auto_migrate<D: Database + ?Sized>(db: &mut D, config: &MigrationConfig) -> Result<()> {
    Migrator::from_config(config)?.migrate(db)?;
    Ok(())
}
