use std::ops::{Deref, DerefMut};
use std::time::Duration;

use itinerary_common::{Error, Result};
use itinerary_db::Database;
use tracing::{debug, warn};

use crate::observer::MigrationObserver;

/// Cross-process mutual exclusion for migration runs, keyed by `lock_id`.
#[derive(Debug, Clone, Copy)]
pub struct AdvisoryLock {
    lock_id: i64,
    retry_interval: Duration,
}

impl AdvisoryLock {
    pub fn new(lock_id: i64, retry_interval: Duration) -> Self {
        Self {
            lock_id,
            retry_interval,
        }
    }

    pub fn lock_id(&self) -> i64 {
        self.lock_id
    }

    /// Poll until the lock is ours. There is no timeout: a held lock or a
    /// transient connection error means sleep and try again. Any other error
    /// is returned.
    pub fn acquire<'a, D: Database + ?Sized>(
        &self,
        db: &'a mut D,
        observer: &dyn MigrationObserver,
    ) -> Result<LockGuard<'a, D>> {
        let mut attempt: u64 = 0;
        loop {
            match db.try_advisory_lock(self.lock_id) {
                Ok(true) => {
                    observer.lock_acquired(self.lock_id);
                    return Ok(LockGuard {
                        db,
                        lock_id: self.lock_id,
                    });
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => {
                    warn!("lock attempt for {} failed, retrying: {e}", self.lock_id);
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
            observer.lock_contended(self.lock_id, attempt);
            std::thread::sleep(self.retry_interval);
        }
    }
}

/// Holds the lock for as long as it lives and releases it when dropped, on
/// return, on error and during unwinding. Under `panic = "abort"` no drop
/// runs; the server frees the session lock when the process dies and a
/// SQLite lease simply expires. Derefs to the locked database session.
pub struct LockGuard<'a, D: Database + ?Sized> {
    db: &'a mut D,
    lock_id: i64,
}

impl<D: Database + ?Sized> LockGuard<'_, D> {
    /// Re-assert ownership before doing more work under the lock, pushing
    /// back a lease deadline where the backend has one. Fails with
    /// [`Error::LockLost`] if another session now holds the lock.
    pub fn renew(&mut self) -> Result<()> {
        if self.db.renew_advisory_lock(self.lock_id)? {
            Ok(())
        } else {
            Err(Error::LockLost {
                lock_id: self.lock_id,
            })
        }
    }
}

impl<D: Database + ?Sized> Deref for LockGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.db
    }
}

impl<D: Database + ?Sized> DerefMut for LockGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.db
    }
}

impl<D: Database + ?Sized> Drop for LockGuard<'_, D> {
    fn drop(&mut self) {
        // Not retried: if the session is gone the server has already dropped
        // the lock along with it.
        match self.db.advisory_unlock(self.lock_id) {
            Ok(()) => debug!("released migration lock {}", self.lock_id),
            Err(e) => warn!("failed to release migration lock {}: {e}", self.lock_id),
        }
    }
}
