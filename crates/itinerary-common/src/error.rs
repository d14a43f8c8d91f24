use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not parse id from migration file: {name}")]
    MalformedIdentifier { name: String },

    #[error("found two migrations with identical id {id}: {first} and {second}")]
    DuplicateIdentifier {
        id: i64,
        first: String,
        second: String,
    },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration lock {lock_id} was taken over by another session")]
    LockLost { lock_id: i64 },

    #[error("migration {id} ({name}) failed: {source}")]
    MigrationFailed {
        id: i64,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("corrupt version state in {table}: {detail}")]
    CorruptVersionState { table: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failure is a connectivity blip worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("bad yaml".into());
        assert_eq!(e.to_string(), "configuration error: bad yaml");

        let e = Error::MalformedIdentifier {
            name: "init.sql".into(),
        };
        assert_eq!(
            e.to_string(),
            "could not parse id from migration file: init.sql"
        );

        let e = Error::DuplicateIdentifier {
            id: 3,
            first: "3_a.sql".into(),
            second: "3_b.sql".into(),
        };
        assert_eq!(
            e.to_string(),
            "found two migrations with identical id 3: 3_a.sql and 3_b.sql"
        );

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }

    #[test]
    fn migration_failure_keeps_source() {
        let e = Error::MigrationFailed {
            id: 2,
            name: "2_seed.sql".into(),
            source: Box::new(Error::Database("no such table: t".into())),
        };
        assert_eq!(
            e.to_string(),
            "migration 2 (2_seed.sql) failed: database error: no such table: t"
        );
        let source = std::error::Error::source(&e).unwrap();
        assert_eq!(source.to_string(), "database error: no such table: t");
    }

    #[test]
    fn only_connection_errors_are_transient() {
        assert!(Error::Connection("reset by peer".into()).is_transient());
        assert!(!Error::Database("syntax error".into()).is_transient());
        assert!(
            !Error::CorruptVersionState {
                table: "_version".into(),
                detail: "2 rows".into()
            }
            .is_transient()
        );
        assert!(!Error::LockLost { lock_id: 0 }.is_transient());
    }
}
