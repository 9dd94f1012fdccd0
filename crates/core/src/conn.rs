//! Backend connection abstraction
//!
//! The engine needs only a handful of typed operations from a live database
//! session. They are collected behind one object-safe trait so the runner,
//! version store and lock coordinator stay backend-agnostic, and so tests
//! can exercise the whole state machine against an in-memory fake.
//!
//! One connection is owned exclusively by one in-flight operation; advisory
//! locks are session-scoped, so the lock, the version reads/writes and the
//! migration bodies must all travel over the same session.

use async_trait::async_trait;

use crate::error::MigrateResult;

/// One `(version_id, is_applied)` row from the bookkeeping table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRow {
    pub version_id: i64,
    pub is_applied: bool,
}

/// A single database session capable of running migrations
#[async_trait]
pub trait MigrationConn: Send {
    /// Execute a statement with no bound parameters (DDL, migration bodies).
    async fn execute(&mut self, sql: &str) -> MigrateResult<()>;

    /// Execute the dialect's insert-version statement.
    async fn insert_version(
        &mut self,
        sql: &str,
        version_id: i64,
        is_applied: bool,
    ) -> MigrateResult<()>;

    /// Execute the dialect's delete-version statement.
    async fn delete_version(&mut self, sql: &str, version_id: i64) -> MigrateResult<()>;

    /// Fetch the version history, newest insertion first.
    async fn fetch_version_rows(&mut self, sql: &str) -> MigrateResult<Vec<VersionRow>>;

    /// Issue the dialect's lock statement bound to `lock_id`.
    ///
    /// Returns whether the lock was obtained. Blocking primitives only
    /// return once they hold the lock and so always report `true`; timed
    /// primitives report `false` on timeout.
    async fn acquire_lock(&mut self, sql: &str, lock_id: i64) -> MigrateResult<bool>;

    /// Issue the matching unlock statement.
    async fn release_lock(&mut self, sql: &str, lock_id: i64) -> MigrateResult<()>;

    /// Open the transaction scoping one migration step.
    async fn begin(&mut self) -> MigrateResult<()>;

    /// Commit the step's transaction.
    async fn commit(&mut self) -> MigrateResult<()>;

    /// Abandon the step's transaction.
    async fn rollback(&mut self) -> MigrateResult<()>;
}
