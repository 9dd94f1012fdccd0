//! Cross-process advisory locking
//!
//! Migration runs are serialized across processes with a backend-native
//! advisory lock whose id is derived deterministically from the version
//! table name. Two runners pointed at the same table contend for the same
//! lock; runners using different tables never contend.

use tracing::debug;
use uuid::Uuid;

use crate::conn::MigrationConn;
use crate::dialect::{Dialect, LockStrategy};
use crate::error::{MigrateError, MigrateResult};

/// Derive the advisory lock id for a version table name.
///
/// Stable across process restarts and backends: a UUIDv5 digest of the
/// table name, folded into the non-negative `i64` range both
/// `pg_advisory_lock` and `GET_LOCK` accept.
pub fn advisory_lock_id(table: &str) -> i64 {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, table.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_be_bytes(raw) & (i64::MAX as u64)) as i64
}

/// Acquires and releases the advisory lock for one runner operation
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    dialect: Dialect,
    lock_id: i64,
}

impl LockCoordinator {
    pub fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            lock_id: advisory_lock_id(table),
        }
    }

    pub fn lock_id(&self) -> i64 {
        self.lock_id
    }

    /// Acquire the lock on this session.
    ///
    /// Blocking backends wait inside the lock statement itself. Timed
    /// backends retry a bounded number of attempts, each waiting server-side
    /// for the dialect's timeout, then fail with
    /// [`MigrateError::LockFailed`].
    pub async fn acquire(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        let sql = self.dialect.lock_sql();
        match self.dialect.lock_strategy() {
            LockStrategy::Blocking => {
                debug!(lock_id = self.lock_id, "waiting for migration lock");
                conn.acquire_lock(&sql, self.lock_id).await?;
                debug!(lock_id = self.lock_id, "migration lock acquired");
                Ok(())
            }
            LockStrategy::Retry { max_retries, .. } => {
                let attempts = max_retries + 1;
                for attempt in 1..=attempts {
                    if conn.acquire_lock(&sql, self.lock_id).await? {
                        debug!(lock_id = self.lock_id, attempt, "migration lock acquired");
                        return Ok(());
                    }
                    debug!(
                        lock_id = self.lock_id,
                        attempt, "migration lock wait timed out, retrying"
                    );
                }
                Err(MigrateError::LockFailed { attempts })
            }
        }
    }

    /// Release the lock on this session.
    pub async fn release(&self, conn: &mut dyn MigrationConn) -> MigrateResult<()> {
        conn.release_lock(&self.dialect.unlock_sql(), self.lock_id)
            .await
            .map_err(|e| MigrateError::LockReleaseFailed(e.to_string()))
    }
}
