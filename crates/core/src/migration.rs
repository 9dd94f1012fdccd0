//! Migration units and the on-disk SQL format
//!
//! A migration file is named `<version>_<name>.sql` where `<version>` is a
//! positive integer (sequence number or timestamp). The body is split into
//! an apply and a revert section by `-- Up` and `-- Down` markers:
//!
//! ```sql
//! -- Up
//! CREATE TABLE users (id serial PRIMARY KEY);
//!
//! -- Down
//! DROP TABLE users;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{MigrateError, MigrateResult};

/// One versioned, reversible schema-change step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    /// Position in the total order; unique within a collection
    pub version: i64,
    /// Where the unit came from, for diagnostics
    pub source: PathBuf,
    /// SQL applied by `up`
    pub up_sql: String,
    /// SQL applied by `down`
    pub down_sql: String,
}

impl Migration {
    /// Parse a `<version>_<name>.sql` file into a migration unit.
    pub fn parse_file(path: &Path) -> MigrateResult<Self> {
        let version = version_from_path(path)?;
        let content = fs::read_to_string(path)?;
        let (up_sql, down_sql) = parse_sections(path, &content)?;
        Ok(Migration {
            version,
            source: path.to_path_buf(),
            up_sql,
            down_sql,
        })
    }

    /// The apply section as individual executable statements.
    pub fn up_statements(&self) -> Vec<String> {
        split_statements(&self.up_sql)
    }

    /// The revert section as individual executable statements.
    pub fn down_statements(&self) -> Vec<String> {
        split_statements(&self.down_sql)
    }

    /// The source path as display text for logs and errors.
    pub fn source_display(&self) -> String {
        self.source.display().to_string()
    }
}

/// Extract the numeric version prefix from a migration filename.
pub fn version_from_path(path: &Path) -> MigrateResult<i64> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrateError::InvalidMigrationFile {
            path: path.to_path_buf(),
            message: "filename is not valid UTF-8".to_string(),
        })?;

    let digits = stem.split('_').next().unwrap_or("");
    let version: i64 = digits
        .parse()
        .map_err(|_| MigrateError::InvalidMigrationFile {
            path: path.to_path_buf(),
            message: "filename must start with a numeric version, like 0001_create_users.sql"
                .to_string(),
        })?;

    if version < 1 {
        return Err(MigrateError::InvalidMigrationFile {
            path: path.to_path_buf(),
            message: format!("version must be positive, got {version}"),
        });
    }
    Ok(version)
}

fn parse_sections(path: &Path, content: &str) -> MigrateResult<(String, String)> {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current_section = "";
    let mut saw_up = false;

    for line in content.lines() {
        let trimmed = line.trim().to_lowercase();

        if trimmed.starts_with("-- up") {
            current_section = "up";
            saw_up = true;
            continue;
        } else if trimmed.starts_with("-- down") {
            current_section = "down";
            continue;
        }

        // Skip comment lines and empty lines
        if line.trim().is_empty() || line.trim().starts_with("--") {
            continue;
        }

        match current_section {
            "up" => up_sql.push(line),
            "down" => down_sql.push(line),
            _ => {
                return Err(MigrateError::InvalidMigrationFile {
                    path: path.to_path_buf(),
                    message: "statement before the `-- Up` marker".to_string(),
                })
            }
        }
    }

    if !saw_up {
        return Err(MigrateError::InvalidMigrationFile {
            path: path.to_path_buf(),
            message: "missing `-- Up` marker".to_string(),
        });
    }

    Ok((
        up_sql.join("\n").trim().to_string(),
        down_sql.join("\n").trim().to_string(),
    ))
}

/// Split a migration section into individual statements.
///
/// Uses a real SQL parser so semicolons inside literals or function bodies
/// do not break statements apart; falls back to naive splitting when the
/// section is not parseable as standard SQL.
pub fn split_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }
    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(parsed) => parsed.into_iter().map(|stmt| format!("{};", stmt)).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}

/// Create a new timestamp-versioned migration file in `dir`.
///
/// Returns the path of the created file.
pub fn create_migration_file(dir: &Path, name: &str) -> MigrateResult<PathBuf> {
    fs::create_dir_all(dir)?;

    let version = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let slug = name.trim().replace(' ', "_").to_lowercase();
    let filename = format!("{}_{}.sql", version, slug);
    let path = dir.join(&filename);

    let template = format!(
        "-- Migration: {}\n\
         -- Created: {}\n\n\
         -- Up\n\n\n\
         -- Down\n\n",
        name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    fs::write(&path, template)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_versioned_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0003_add_widgets.sql");
        fs::write(
            &path,
            "-- Up\nCREATE TABLE widgets (id bigint);\n\n-- Down\nDROP TABLE widgets;\n",
        )
        .unwrap();

        let m = Migration::parse_file(&path).unwrap();
        assert_eq!(m.version, 3);
        assert!(m.up_sql.contains("CREATE TABLE widgets"));
        assert!(m.down_sql.contains("DROP TABLE widgets"));
        assert_eq!(m.source, path);
    }

    #[test]
    fn rejects_missing_version_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("add_widgets.sql");
        fs::write(&path, "-- Up\nSELECT 1;\n").unwrap();

        let err = Migration::parse_file(&path).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidMigrationFile { .. }));
    }

    #[test]
    fn rejects_missing_up_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001_bad.sql");
        fs::write(&path, "CREATE TABLE t (id int);\n").unwrap();

        let err = Migration::parse_file(&path).unwrap_err();
        match err {
            MigrateError::InvalidMigrationFile { message, .. } => {
                assert!(message.contains("-- Up"))
            }
            other => panic!("expected InvalidMigrationFile, got {other:?}"),
        }
    }

    #[test]
    fn empty_down_section_is_allowed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001_forward_only.sql");
        fs::write(&path, "-- Up\nCREATE TABLE t (id int);\n-- Down\n").unwrap();

        let m = Migration::parse_file(&path).unwrap();
        assert!(m.down_sql.is_empty());
        assert!(m.down_statements().is_empty());
    }

    #[test]
    fn splits_multiple_statements() {
        let statements = split_statements(
            "CREATE TABLE a (id int);\nCREATE TABLE b (id int);\nINSERT INTO a VALUES (1);",
        );
        assert_eq!(statements.len(), 3);
        assert!(statements[2].starts_with("INSERT INTO a"));
    }

    #[test]
    fn created_file_round_trips_through_parser() {
        let dir = TempDir::new().unwrap();
        let path = create_migration_file(dir.path(), "create users table").unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_create_users_table.sql"));

        // The template itself must parse as a (empty) migration.
        let m = Migration::parse_file(&path).unwrap();
        assert!(m.up_sql.is_empty());
        assert!(m.down_sql.is_empty());
    }
}
