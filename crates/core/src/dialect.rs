//! SQL dialect strategies
//!
//! Each supported backend differs only in a handful of statements: the
//! version-table DDL, the insert/delete of version rows, the history query
//! and the advisory-lock primitives. The variant set is closed, so this is
//! plain enum dispatch rather than open-ended trait objects. The selected
//! dialect is threaded explicitly through configuration; there is no
//! process-wide mutable default.

use crate::error::{MigrateError, MigrateResult};

/// Seconds a MySQL-family `GET_LOCK` call waits before reporting a timeout.
pub const LOCK_WAIT_SECS: u32 = 30;

/// Attempts made against a timed-out `GET_LOCK` before giving up.
pub const LOCK_MAX_RETRIES: u32 = 15;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL and compatible servers
    Postgres,
    /// MySQL and compatible servers
    MySql,
    /// TiDB (MySQL wire protocol, distributed storage)
    TiDb,
}

/// How a dialect's lock primitive behaves when the lock is contended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    /// The lock statement itself waits until the lock is granted
    Blocking,
    /// The lock statement times out; retry up to `max_retries` times
    Retry { max_retries: u32, wait_secs: u32 },
}

impl Dialect {
    /// Resolve a configuration string into a dialect.
    ///
    /// Fails with [`MigrateError::UnknownDialect`] before any database call
    /// is made.
    pub fn from_name(name: &str) -> MigrateResult<Self> {
        match name {
            "postgres" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "tidb" => Ok(Dialect::TiDb),
            other => Err(MigrateError::UnknownDialect {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::TiDb => "tidb",
        }
    }

    /// DDL for the bookkeeping table.
    ///
    /// `IF NOT EXISTS` so concurrent bootstraps and repeated runs are
    /// no-ops rather than errors.
    pub fn create_version_table_sql(&self, table: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id serial NOT NULL,\n    \
                    version_id bigint NOT NULL,\n    \
                    is_applied boolean NOT NULL,\n    \
                    tstamp timestamp NULL default now(),\n    \
                    PRIMARY KEY(id)\n\
                );",
                table
            ),
            // TiDB has no serial type; AUTO_INCREMENT ids are only unique,
            // not monotonic across nodes, which is fine for tie-breaking
            // within one runner's inserts.
            Dialect::TiDb => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT UNIQUE,\n    \
                    version_id bigint NOT NULL,\n    \
                    is_applied boolean NOT NULL,\n    \
                    tstamp timestamp NULL default now(),\n    \
                    PRIMARY KEY(id)\n\
                );",
                table
            ),
        }
    }

    /// Insert statement for one version row, parameterized by
    /// `(version_id, is_applied)`.
    pub fn insert_version_sql(&self, table: &str) -> String {
        format!(
            "INSERT INTO {} (version_id, is_applied) VALUES ({}, {});",
            table,
            self.placeholder(1),
            self.placeholder(2)
        )
    }

    /// Delete statement for all rows of one version, parameterized by
    /// `(version_id)`.
    pub fn delete_version_sql(&self, table: &str) -> String {
        format!(
            "DELETE FROM {} WHERE version_id={};",
            table,
            self.placeholder(1)
        )
    }

    /// Query returning all `(version_id, is_applied)` rows, newest
    /// insertion first.
    pub fn version_history_sql(&self, table: &str) -> String {
        format!(
            "SELECT version_id, is_applied FROM {} ORDER BY id DESC",
            table
        )
    }

    /// Statement acquiring the advisory lock, parameterized by the lock id.
    pub fn lock_sql(&self) -> String {
        match self {
            Dialect::Postgres => "SELECT pg_advisory_lock($1)".to_string(),
            Dialect::MySql | Dialect::TiDb => {
                format!("SELECT GET_LOCK(?, {})", LOCK_WAIT_SECS)
            }
        }
    }

    /// Statement releasing the advisory lock, parameterized by the lock id.
    pub fn unlock_sql(&self) -> String {
        match self {
            Dialect::Postgres => "SELECT pg_advisory_unlock($1)".to_string(),
            Dialect::MySql | Dialect::TiDb => "SELECT RELEASE_LOCK(?)".to_string(),
        }
    }

    /// Contention behavior of [`Dialect::lock_sql`].
    pub fn lock_strategy(&self) -> LockStrategy {
        match self {
            Dialect::Postgres => LockStrategy::Blocking,
            Dialect::MySql | Dialect::TiDb => LockStrategy::Retry {
                max_retries: LOCK_MAX_RETRIES,
                wait_secs: LOCK_WAIT_SECS,
            },
        }
    }

    fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", position),
            Dialect::MySql | Dialect::TiDb => "?".to_string(),
        }
    }
}
