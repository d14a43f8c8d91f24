pub mod database;
pub mod pg;
pub mod sqlite;

pub use database::{Database, Executor};
pub use pg::PostgresDatabase;
pub use sqlite::SqliteDatabase;
