//! Applies numbered SQL scripts to a database exactly once each.
//!
//! A run takes an advisory lock, reads the single-row version table, and
//! applies every script whose id is above the stored version in ascending
//! order, each in its own transaction together with the version bump.

pub mod engine;
pub mod lock;
pub mod observer;
pub mod source;
pub mod version;

#[cfg(test)]
mod fake;

pub use engine::{MigrationReport, MigrationSettings, Migrator, auto_migrate};
pub use lock::{AdvisoryLock, LockGuard};
pub use observer::{MigrationObserver, TracingObserver};
pub use source::{DirectorySource, MemorySource, MigrationScript, MigrationSource, discover};
pub use version::VersionStore;
