//! Version bookkeeping
//!
//! The version table is an append-only log: applying a migration inserts an
//! `is_applied = true` row, reverting one deletes that version's rows. The
//! current version is derived by scanning the history newest-first, which
//! keeps concurrent observers consistent under the advisory-lock model and
//! doubles as an audit trail.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::conn::MigrationConn;
use crate::dialect::Dialect;
use crate::error::{MigrateError, MigrateResult};

/// Default name of the bookkeeping table
pub const DEFAULT_VERSION_TABLE: &str = "milepost_db_version";

/// Reads and writes the version bookkeeping table
#[derive(Debug, Clone)]
pub struct VersionStore {
    dialect: Dialect,
    table: String,
}

impl VersionStore {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the version table and its baseline row if they do not exist.
    ///
    /// The DDL is `IF NOT EXISTS` and the baseline `(0, true)` row is only
    /// inserted into an empty history, so [`current_version`] reports 0 on
    /// a fresh database. Mutating operations call this while holding the
    /// advisory lock, which serializes bootstrap across replicas; read
    /// errors here are real errors, never a create-table trigger.
    ///
    /// [`current_version`]: VersionStore::current_version
    pub async fn ensure_version_table(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        conn.execute(&self.dialect.create_version_table_sql(&self.table))
            .await
            .map_err(|e| MigrateError::VersionStore(e.to_string()))?;

        let rows = conn
            .fetch_version_rows(&self.dialect.version_history_sql(&self.table))
            .await
            .map_err(|e| MigrateError::VersionStore(e.to_string()))?;
        if rows.is_empty() {
            debug!(table = %self.table, "initializing version table baseline");
            conn.insert_version(&self.dialect.insert_version_sql(&self.table), 0, true)
                .await
                .map_err(|e| MigrateError::VersionStore(e.to_string()))?;
        }
        Ok(())
    }

    /// Compute the current applied version from the row history.
    ///
    /// Scans newest insertion first; the first version whose newest record
    /// reports applied wins. An empty or fully-reverted history yields 0.
    pub async fn current_version(&self, conn: &mut dyn MigrationConn) -> MigrateResult<i64> {
        let rows = conn
            .fetch_version_rows(&self.dialect.version_history_sql(&self.table))
            .await
            .map_err(|e| MigrateError::VersionStore(e.to_string()))?;

        let mut seen: HashSet<i64> = HashSet::new();
        let mut current: Option<i64> = None;

        for row in rows {
            if !seen.insert(row.version_id) {
                continue;
            }
            if !row.is_applied {
                continue;
            }
            match current {
                None => current = Some(row.version_id),
                Some(version) if row.version_id > version => {
                    // A higher version is still applied beneath a newer
                    // record for a lower one, e.g. after a crashed run.
                    // Trust the newest record but make the state visible.
                    warn!(
                        newest = version,
                        also_applied = row.version_id,
                        table = %self.table,
                        "version history reports multiple applied versions; trusting newest record"
                    );
                }
                Some(_) => {}
            }
        }

        Ok(current.unwrap_or(0))
    }

    /// Every version whose newest record reports applied, excluding the
    /// baseline 0 row.
    pub async fn applied_versions(
        &self,
        conn: &mut dyn MigrationConn,
    ) -> MigrateResult<HashSet<i64>> {
        let rows = conn
            .fetch_version_rows(&self.dialect.version_history_sql(&self.table))
            .await
            .map_err(|e| MigrateError::VersionStore(e.to_string()))?;

        let mut seen: HashSet<i64> = HashSet::new();
        let mut applied: HashSet<i64> = HashSet::new();
        for row in rows {
            if !seen.insert(row.version_id) {
                continue;
            }
            if row.is_applied && row.version_id != 0 {
                applied.insert(row.version_id);
            }
        }
        Ok(applied)
    }

    /// Append an applied record for `version`.
    pub async fn record_apply(
        &self,
        conn: &mut dyn MigrationConn,
        version: i64,
    ) -> MigrateResult<()> {
        conn.insert_version(&self.dialect.insert_version_sql(&self.table), version, true)
            .await
            .map_err(|e| MigrateError::VersionStore(e.to_string()))
    }

    /// Remove the records for `version` so it no longer reports as applied.
    pub async fn record_revert(
        &self,
        conn: &mut dyn MigrationConn,
        version: i64,
    ) -> MigrateResult<()> {
        conn.delete_version(&self.dialect.delete_version_sql(&self.table), version)
            .await
            .map_err(|e| MigrateError::VersionStore(e.to_string()))
    }
}
