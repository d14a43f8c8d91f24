use tracing::{debug, info};

use crate::engine::MigrationReport;
use crate::source::MigrationScript;

/// Receives progress events from a migration run. Every method has an empty
/// default so implementors only override what they care about.
pub trait MigrationObserver {
    /// The lock is held elsewhere (or the attempt hit a transient error);
    /// another attempt follows after the retry interval.
    fn lock_contended(&self, _lock_id: i64, _attempt: u64) {}

    fn lock_acquired(&self, _lock_id: i64) {}

    fn applying(&self, _script: &MigrationScript) {}

    fn applied(&self, _script: &MigrationScript) {}

    fn finished(&self, _report: &MigrationReport) {}
}

/// Default observer: reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn lock_contended(&self, lock_id: i64, attempt: u64) {
        if attempt == 1 {
            info!("waiting for migration lock {lock_id}");
        } else {
            debug!("migration lock {lock_id} still held, attempt {attempt}");
        }
    }

    fn lock_acquired(&self, lock_id: i64) {
        debug!("acquired migration lock {lock_id}");
    }

    fn applying(&self, script: &MigrationScript) {
        info!("Applying migration: {}", script.name);
    }

    fn finished(&self, report: &MigrationReport) {
        if report.applied.is_empty() {
            info!("database is up to date at version {}", report.to_version);
        } else {
            info!(
                "applied {} migrations, version {} -> {}",
                report.applied.len(),
                report.from_version,
                report.to_version
            );
        }
    }
}
