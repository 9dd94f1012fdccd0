//! Migration runner
//!
//! Orchestrates the public operations (`up`, `up_to`, `up_by_one`, `down`,
//! `down_to`, `redo`) over one dedicated database session. Every operation
//! follows the same shape: rebuild the collection from disk, take the
//! session-scoped advisory lock for the whole operation, make sure the
//! version table exists, run the resolve-execute-record loop, then release
//! the lock. Each migration step commits in its own transaction, so the
//! steps that succeeded before a failure stay applied; only the failing
//! step is rolled back, and the lock is released on every exit path.
//!
//! `NoNextVersion` and `NoCurrentVersion` at the top of a multi-step loop
//! are termination signals, not failures; only `up_by_one` surfaces
//! `NoNextVersion` to its caller.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::collection::{MigrationCollection, MAX_VERSION, MIN_VERSION};
use crate::conn::MigrationConn;
use crate::dialect::Dialect;
use crate::error::{MigrateError, MigrateResult};
use crate::lock::LockCoordinator;
use crate::migration::Migration;
use crate::store::{VersionStore, DEFAULT_VERSION_TABLE};

/// Applied/pending state of one migration, for status listings
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub source: PathBuf,
    pub applied: bool,
}

/// Runs migration operations against one database
pub struct Migrator {
    dialect: Dialect,
    migrations_dir: PathBuf,
    store: VersionStore,
    lock: LockCoordinator,
}

impl Migrator {
    /// Migrator over `migrations_dir` using the default version table.
    pub fn new(dialect: Dialect, migrations_dir: impl Into<PathBuf>) -> Self {
        Self::with_table(dialect, migrations_dir, DEFAULT_VERSION_TABLE)
    }

    /// Migrator with a custom version table name. Runners sharing a table
    /// name contend for the same advisory lock.
    pub fn with_table(
        dialect: Dialect,
        migrations_dir: impl Into<PathBuf>,
        table: &str,
    ) -> Self {
        Self {
            dialect,
            migrations_dir: migrations_dir.into(),
            store: VersionStore::new(dialect, table),
            lock: LockCoordinator::new(dialect, table),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Apply all pending migrations.
    pub async fn up(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        self.up_to(conn, MAX_VERSION).await
    }

    /// Apply pending migrations up to and including `target`.
    ///
    /// The collection is restricted to versions `<= target`, so the apply
    /// loop stops at the boundary naturally. Already at or past the target
    /// is a successful no-op.
    pub async fn up_to(&self, conn: &mut dyn MigrationConn, target: i64) -> MigrateResult<()> {
        let collection = MigrationCollection::collect(&self.migrations_dir, MIN_VERSION, target)?;
        self.lock.acquire(conn).await?;
        let outcome = self.apply_pending(conn, &collection).await;
        self.finish(conn, outcome).await
    }

    /// Apply the next pending migration only.
    ///
    /// Unlike [`up`], `NoNextVersion` is surfaced to the caller when the
    /// database is already at the latest version.
    ///
    /// [`up`]: Migrator::up
    pub async fn up_by_one(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        let collection =
            MigrationCollection::collect(&self.migrations_dir, MIN_VERSION, MAX_VERSION)?;
        self.lock.acquire(conn).await?;
        let outcome = self.apply_next(conn, &collection).await;
        self.finish(conn, outcome).await
    }

    /// Roll back the most recently applied migration.
    ///
    /// Fails with [`MigrateError::NoCurrentVersion`] when nothing is
    /// applied or the current version has no migration file.
    pub async fn down(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        let collection =
            MigrationCollection::collect(&self.migrations_dir, MIN_VERSION, MAX_VERSION)?;
        self.lock.acquire(conn).await?;
        let outcome = self.revert_current(conn, &collection).await;
        self.finish(conn, outcome).await
    }

    /// Roll back migrations until `target` (or lower) is current.
    pub async fn down_to(&self, conn: &mut dyn MigrationConn, target: i64) -> MigrateResult<()> {
        let collection =
            MigrationCollection::collect(&self.migrations_dir, MIN_VERSION, MAX_VERSION)?;
        self.lock.acquire(conn).await?;
        let outcome = self.revert_until(conn, &collection, target).await;
        self.finish(conn, outcome).await
    }

    /// Roll back the current migration, then apply it again.
    pub async fn redo(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        let collection =
            MigrationCollection::collect(&self.migrations_dir, MIN_VERSION, MAX_VERSION)?;
        self.lock.acquire(conn).await?;
        let outcome = self.redo_current(conn, &collection).await;
        self.finish(conn, outcome).await
    }

    /// Current applied version, without taking the lock.
    pub async fn version(&self, conn: &mut dyn MigrationConn) -> MigrateResult<i64> {
        self.store.ensure_version_table(conn).await?;
        self.store.current_version(conn).await
    }

    /// Applied/pending state of every migration on disk, without taking
    /// the lock.
    pub async fn status(&self, conn: &mut dyn MigrationConn) -> MigrateResult<Vec<MigrationStatus>> {
        let collection =
            MigrationCollection::collect(&self.migrations_dir, MIN_VERSION, MAX_VERSION)?;
        self.store.ensure_version_table(conn).await?;
        let applied = self.store.applied_versions(conn).await?;

        Ok(collection
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                source: m.source.clone(),
                applied: applied.contains(&m.version),
            })
            .collect())
    }

    /// Release the lock before reporting the outcome. The advisory lock is
    /// session-scoped, so release runs on every exit path; the operation's
    /// own error always wins over a release failure, which is only logged.
    async fn finish(
        &self,
        conn: &mut dyn MigrationConn,
        outcome: MigrateResult<()>,
    ) -> MigrateResult<()> {
        if let Err(err) = self.lock.release(conn).await {
            warn!(error = %err, "failed to release migration lock");
        }
        outcome
    }

    async fn apply_pending(
        &self,
        conn: &mut dyn MigrationConn,
        collection: &MigrationCollection,
    ) -> MigrateResult<()> {
        self.store.ensure_version_table(conn).await?;
        loop {
            let current = self.store.current_version(conn).await?;
            let next = match collection.next(current) {
                Ok(migration) => migration,
                Err(MigrateError::NoNextVersion) => {
                    info!(current, "no migrations to run");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            self.apply(conn, next).await?;
        }
    }

    async fn apply_next(
        &self,
        conn: &mut dyn MigrationConn,
        collection: &MigrationCollection,
    ) -> MigrateResult<()> {
        self.store.ensure_version_table(conn).await?;
        let current = self.store.current_version(conn).await?;
        let next = collection.next(current)?;
        self.apply(conn, next).await
    }

    async fn revert_current(
        &self,
        conn: &mut dyn MigrationConn,
        collection: &MigrationCollection,
    ) -> MigrateResult<()> {
        self.store.ensure_version_table(conn).await?;
        let current = self.store.current_version(conn).await?;
        let migration = collection.current(current)?;
        self.revert(conn, migration).await
    }

    async fn revert_until(
        &self,
        conn: &mut dyn MigrationConn,
        collection: &MigrationCollection,
        target: i64,
    ) -> MigrateResult<()> {
        self.store.ensure_version_table(conn).await?;
        loop {
            let current = self.store.current_version(conn).await?;
            let migration = match collection.current(current) {
                Ok(migration) => migration,
                Err(MigrateError::NoCurrentVersion { .. }) => {
                    info!(current, "no migrations to roll back");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            if migration.version <= target {
                info!(current, target, "reached rollback target");
                return Ok(());
            }
            self.revert(conn, migration).await?;
        }
    }

    async fn redo_current(
        &self,
        conn: &mut dyn MigrationConn,
        collection: &MigrationCollection,
    ) -> MigrateResult<()> {
        self.store.ensure_version_table(conn).await?;
        let current = self.store.current_version(conn).await?;
        let migration = collection.current(current)?;
        self.revert(conn, migration).await?;
        self.apply(conn, migration).await
    }

    /// Execute one migration step's statements and its version record in
    /// a transaction of its own, so earlier committed steps survive a
    /// later failure and only the failing step is rolled back.
    async fn apply(&self, conn: &mut dyn MigrationConn, migration: &Migration) -> MigrateResult<()> {
        info!(
            version = migration.version,
            source = %migration.source.display(),
            "applying migration"
        );
        conn.begin().await?;
        let result = self.apply_in_step_tx(conn, migration).await;
        self.settle_step(conn, result).await
    }

    async fn apply_in_step_tx(
        &self,
        conn: &mut dyn MigrationConn,
        migration: &Migration,
    ) -> MigrateResult<()> {
        for statement in migration.up_statements() {
            conn.execute(&statement)
                .await
                .map_err(|e| MigrateError::Execution {
                    version: migration.version,
                    file: migration.source_display(),
                    message: e.to_string(),
                })?;
        }
        self.store.record_apply(conn, migration.version).await
    }

    async fn revert(&self, conn: &mut dyn MigrationConn, migration: &Migration) -> MigrateResult<()> {
        info!(
            version = migration.version,
            source = %migration.source.display(),
            "rolling back migration"
        );
        conn.begin().await?;
        let result = self.revert_in_step_tx(conn, migration).await;
        self.settle_step(conn, result).await
    }

    async fn revert_in_step_tx(
        &self,
        conn: &mut dyn MigrationConn,
        migration: &Migration,
    ) -> MigrateResult<()> {
        for statement in migration.down_statements() {
            conn.execute(&statement)
                .await
                .map_err(|e| MigrateError::Execution {
                    version: migration.version,
                    file: migration.source_display(),
                    message: e.to_string(),
                })?;
        }
        self.store.record_revert(conn, migration.version).await
    }

    async fn settle_step(
        &self,
        conn: &mut dyn MigrationConn,
        result: MigrateResult<()>,
    ) -> MigrateResult<()> {
        match result {
            Ok(()) => {
                conn.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rb) = conn.rollback().await {
                    warn!(error = %rb, "failed to roll back migration step");
                }
                Err(err)
            }
        }
    }
}
