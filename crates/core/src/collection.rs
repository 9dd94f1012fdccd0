//! Ordered migration collections
//!
//! A collection is rebuilt from disk on every public runner call; it is
//! never cached and never mutated after construction. Navigation is
//! version-based: `current`, `next` and `previous` resolve units relative
//! to whatever the version store reports as applied.

use std::path::Path;

use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// Lower bound for collected versions
pub const MIN_VERSION: i64 = 0;

/// Upper bound for collected versions
pub const MAX_VERSION: i64 = i64::MAX;

/// A totally-ordered, duplicate-free sequence of migrations
#[derive(Debug, Default)]
pub struct MigrationCollection {
    migrations: Vec<Migration>,
}

impl MigrationCollection {
    /// Scan `dir` for `*.sql` migration files with versions inside
    /// `[min, max]`, sorted ascending by version.
    ///
    /// A missing directory yields an empty collection; an unparsable file
    /// or a duplicate version fails the whole collection.
    pub fn collect(dir: &Path, min: i64, max: i64) -> MigrateResult<Self> {
        let mut migrations: Vec<Migration> = Vec::new();

        if !dir.exists() {
            return Ok(Self { migrations });
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                let migration = Migration::parse_file(&path)?;
                if migration.version < min || migration.version > max {
                    continue;
                }
                migrations.push(migration);
            }
        }

        migrations.sort_by_key(|m| m.version);

        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrateError::DuplicateVersion {
                    version: pair[0].version,
                    first: pair[0].source.clone(),
                    second: pair[1].source.clone(),
                });
            }
        }

        Ok(Self { migrations })
    }

    /// The unit whose version equals `version`.
    pub fn current(&self, version: i64) -> MigrateResult<&Migration> {
        self.migrations
            .iter()
            .find(|m| m.version == version)
            .ok_or(MigrateError::NoCurrentVersion { version })
    }

    /// The smallest unit with a version greater than `version`.
    pub fn next(&self, version: i64) -> MigrateResult<&Migration> {
        self.migrations
            .iter()
            .find(|m| m.version > version)
            .ok_or(MigrateError::NoNextVersion)
    }

    /// The largest unit with a version smaller than `version`.
    pub fn previous(&self, version: i64) -> MigrateResult<&Migration> {
        self.migrations
            .iter()
            .rev()
            .find(|m| m.version < version)
            .ok_or(MigrateError::NoNextVersion)
    }

    /// Highest version in the collection, if any.
    pub fn latest(&self) -> Option<i64> {
        self.migrations.last().map(|m| m.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_migration(dir: &Path, version: i64, name: &str) {
        let body = format!(
            "-- Up\nCREATE TABLE {name} (id bigint);\n-- Down\nDROP TABLE {name};\n"
        );
        fs::write(dir.join(format!("{version:04}_{name}.sql")), body).unwrap();
    }

    #[test]
    fn missing_directory_is_an_empty_collection() {
        let dir = TempDir::new().unwrap();
        let collection =
            MigrationCollection::collect(&dir.path().join("nope"), MIN_VERSION, MAX_VERSION)
                .unwrap();
        assert!(collection.is_empty());
        assert_eq!(collection.latest(), None);
    }

    #[test]
    fn collects_sorted_by_version() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), 3, "widgets");
        write_migration(dir.path(), 1, "users");
        write_migration(dir.path(), 2, "orders");

        let collection =
            MigrationCollection::collect(dir.path(), MIN_VERSION, MAX_VERSION).unwrap();
        let versions: Vec<i64> = collection.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(collection.latest(), Some(3));
    }

    #[test]
    fn navigation_over_increasing_versions() {
        let dir = TempDir::new().unwrap();
        for (v, name) in [(1, "a"), (2, "b"), (5, "c")] {
            write_migration(dir.path(), v, name);
        }
        let collection =
            MigrationCollection::collect(dir.path(), MIN_VERSION, MAX_VERSION).unwrap();

        assert_eq!(collection.next(0).unwrap().version, 1);
        assert_eq!(collection.next(2).unwrap().version, 5);
        assert!(matches!(
            collection.next(5).unwrap_err(),
            MigrateError::NoNextVersion
        ));

        assert_eq!(collection.previous(5).unwrap().version, 2);
        assert!(matches!(
            collection.previous(1).unwrap_err(),
            MigrateError::NoNextVersion
        ));

        assert_eq!(collection.current(2).unwrap().version, 2);
        assert!(matches!(
            collection.current(0).unwrap_err(),
            MigrateError::NoCurrentVersion { version: 0 }
        ));
        assert!(matches!(
            collection.current(4).unwrap_err(),
            MigrateError::NoCurrentVersion { version: 4 }
        ));
    }

    #[test]
    fn range_restriction_excludes_higher_versions() {
        let dir = TempDir::new().unwrap();
        for (v, name) in [(1, "a"), (2, "b"), (3, "c")] {
            write_migration(dir.path(), v, name);
        }
        let collection = MigrationCollection::collect(dir.path(), MIN_VERSION, 2).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(matches!(
            collection.next(2).unwrap_err(),
            MigrateError::NoNextVersion
        ));
    }

    #[test]
    fn duplicate_versions_fail_collection() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), 7, "one");
        // Same version, different name; both files parse on their own.
        write_migration(dir.path(), 7, "two");

        let err = MigrationCollection::collect(dir.path(), MIN_VERSION, MAX_VERSION).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::DuplicateVersion { version: 7, .. }
        ));
    }

    #[test]
    fn unparsable_file_fails_collection() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), 1, "fine");
        fs::write(dir.path().join("0002_broken.sql"), "DROP TABLE t;\n").unwrap();

        let err = MigrationCollection::collect(dir.path(), MIN_VERSION, MAX_VERSION).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidMigrationFile { .. }));
    }
}
