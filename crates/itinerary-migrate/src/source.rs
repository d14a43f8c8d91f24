use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use itinerary_common::{Error, Result};
use tracing::debug;

/// One discovered migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub id: i64,
    /// Resource name the id was parsed from, e.g. `2_add_users.sql`.
    pub name: String,
    /// Script text, executed verbatim.
    pub body: String,
}

/// A listing of named text resources holding migration scripts. No ordering
/// is assumed from the listing.
pub trait MigrationSource {
    fn names(&self) -> Result<Vec<String>>;
    fn read(&self, name: &str) -> Result<String>;
}

/// Every entry of a filesystem directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl MigrationSource for DirectorySource {
    fn names(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| with_path(e, &self.dir))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| with_path(e, &self.dir))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.dir.join(name);
        std::fs::read_to_string(&path).map_err(|e| with_path(e, &path))
    }
}

/// Scripts held in memory, e.g. embedded with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: Vec<(String, String)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.entries.push((name.into(), body.into()));
        self
    }
}

impl<N: Into<String>, B: Into<String>> FromIterator<(N, B)> for MemorySource {
    fn from_iter<I: IntoIterator<Item = (N, B)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, body)| (name.into(), body.into()))
                .collect(),
        }
    }
}

impl MigrationSource for MemorySource {
    fn names(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|(name, _)| name.clone()).collect())
    }

    fn read(&self, name: &str) -> Result<String> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| Error::Other(format!("no migration named {name}")))
    }
}

/// Read every script in `source`, keyed by id.
///
/// A name whose prefix is not a non-negative integer, or two names sharing an
/// id, fail the whole discovery; a partial set is never returned.
pub fn discover<S: MigrationSource + ?Sized>(source: &S) -> Result<BTreeMap<i64, MigrationScript>> {
    let mut migrations: BTreeMap<i64, MigrationScript> = BTreeMap::new();

    for name in source.names()? {
        let id = parse_id(&name).ok_or_else(|| Error::MalformedIdentifier { name: name.clone() })?;
        if let Some(existing) = migrations.get(&id) {
            return Err(Error::DuplicateIdentifier {
                id,
                first: existing.name.clone(),
                second: name,
            });
        }

        let body = source.read(&name)?;
        migrations.insert(id, MigrationScript { id, name, body });
    }

    debug!("discovered {} migrations", migrations.len());
    Ok(migrations)
}

/// The id is everything before the first `_`, or the whole name without one.
fn parse_id(name: &str) -> Option<i64> {
    let token = name.split('_').next().unwrap_or(name);
    let id: i64 = token.parse().ok()?;
    (id >= 0).then_some(id)
}

fn with_path(e: std::io::Error, path: &Path) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("{}: {e}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_integer() {
        assert_eq!(parse_id("1_init.sql"), Some(1));
        assert_eq!(parse_id("0042_add_index_on_users.sql"), Some(42));
        assert_eq!(parse_id("7"), Some(7));
        assert_eq!(parse_id("10__double.sql"), Some(10));
    }

    #[test]
    fn rejects_unparsable_prefixes() {
        assert_eq!(parse_id("init.sql"), None);
        assert_eq!(parse_id("3.sql"), None);
        assert_eq!(parse_id("_3_leading.sql"), None);
        assert_eq!(parse_id("-1_negative.sql"), None);
        assert_eq!(parse_id(".gitkeep"), None);
        assert_eq!(parse_id(""), None);
    }

    #[test]
    fn discovery_keys_scripts_by_id() {
        let source = MemorySource::new()
            .with("3_three.sql", "SELECT 3;")
            .with("1_one.sql", "SELECT 1;")
            .with("2_two.sql", "SELECT 2;");

        let migrations = discover(&source).unwrap();
        let ids: Vec<i64> = migrations.keys().copied().collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(migrations[&2].name, "2_two.sql");
        assert_eq!(migrations[&2].body, "SELECT 2;");
    }

    #[test]
    fn malformed_name_aborts_discovery() {
        let source = MemorySource::new()
            .with("1_ok.sql", "SELECT 1;")
            .with("README.md", "# docs");

        let err = discover(&source).unwrap_err();
        match err {
            Error::MalformedIdentifier { name } => assert_eq!(name, "README.md"),
            other => panic!("expected MalformedIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_abort_discovery() {
        let source = MemorySource::new()
            .with("1_users.sql", "SELECT 1;")
            .with("2_orders.sql", "SELECT 2;")
            .with("01_accounts.sql", "SELECT 1;");

        let err = discover(&source).unwrap_err();
        match err {
            Error::DuplicateIdentifier { id, first, second } => {
                assert_eq!(id, 1);
                assert_eq!(first, "1_users.sql");
                assert_eq!(second, "01_accounts.sql");
            }
            other => panic!("expected DuplicateIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn gaps_are_accepted() {
        let source: MemorySource = [("5_five.sql", ""), ("20_twenty.sql", "")]
            .into_iter()
            .collect();

        let migrations = discover(&source).unwrap();
        assert_eq!(migrations.keys().copied().collect::<Vec<_>>(), vec![5, 20]);
    }

    #[test]
    fn directory_source_reads_every_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1_init.sql"), "CREATE TABLE t (x INTEGER);").unwrap();
        std::fs::write(dir.path().join("2_seed.sql"), "INSERT INTO t VALUES (1);").unwrap();

        let migrations = discover(&DirectorySource::new(dir.path())).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[&1].body, "CREATE TABLE t (x INTEGER);");
        assert_eq!(migrations[&2].name, "2_seed.sql");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("absent"));

        let err = discover(&source).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("absent"));
    }
}
