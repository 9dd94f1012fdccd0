//! In-memory database fake for exercising the engine without a server
//!
//! `MockDb` stands in for one database; any number of `MockConn` sessions
//! can point at it, which lets tests interleave two runners and observe
//! lock hold intervals. `begin` snapshots the version rows and `rollback`
//! restores them, so a rolled-back step really disappears from history;
//! raw statements are recorded but not otherwise replayed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::conn::{MigrationConn, VersionRow};
use crate::error::{MigrateError, MigrateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Acquired(usize),
    Released(usize),
}

#[derive(Debug, Default)]
pub struct MockDb {
    pub table_created: bool,
    /// Version rows in insertion order, oldest first
    pub rows: Vec<VersionRow>,
    /// Every raw statement executed, in order
    pub statements: Vec<String>,
    pub locked_by: Option<usize>,
    pub lock_events: Vec<LockEvent>,
    next_conn_id: usize,
}

impl MockDb {
    pub fn shared() -> Arc<Mutex<MockDb>> {
        Arc::new(Mutex::new(MockDb::default()))
    }
}

pub struct MockConn {
    id: usize,
    db: Arc<Mutex<MockDb>>,
    /// Scripted GET_LOCK timeouts before acquisition is attempted for real
    pub lock_timeouts: u32,
    /// Statements containing this substring fail with a database error
    pub fail_on: Option<String>,
    /// Version rows as of the open transaction's `begin`, if any
    tx_snapshot: Option<Vec<VersionRow>>,
}

impl MockConn {
    pub fn new(db: &Arc<Mutex<MockDb>>) -> Self {
        let id = {
            let mut db = db.lock().unwrap();
            db.next_conn_id += 1;
            db.next_conn_id
        };
        Self {
            id,
            db: Arc::clone(db),
            lock_timeouts: 0,
            fail_on: None,
            tx_snapshot: None,
        }
    }

    /// Insert a history row directly, bypassing the store.
    pub fn push_raw_row(&self, version_id: i64, is_applied: bool) {
        self.db.lock().unwrap().rows.push(VersionRow {
            version_id,
            is_applied,
        });
    }

    fn forced_failure(&self, sql: &str) -> MigrateResult<()> {
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::Database(sqlx::Error::Protocol(format!(
                    "forced failure on {needle:?}"
                ))));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MigrationConn for MockConn {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        self.forced_failure(sql)?;
        let mut db = self.db.lock().unwrap();
        if sql.trim_start().starts_with("CREATE TABLE") {
            db.table_created = true;
        }
        db.statements.push(sql.to_string());
        Ok(())
    }

    async fn insert_version(
        &mut self,
        _sql: &str,
        version_id: i64,
        is_applied: bool,
    ) -> MigrateResult<()> {
        let mut db = self.db.lock().unwrap();
        if !db.table_created {
            return Err(MigrateError::VersionStore(
                "version table does not exist".to_string(),
            ));
        }
        db.rows.push(VersionRow {
            version_id,
            is_applied,
        });
        Ok(())
    }

    async fn delete_version(&mut self, _sql: &str, version_id: i64) -> MigrateResult<()> {
        let mut db = self.db.lock().unwrap();
        db.rows.retain(|row| row.version_id != version_id);
        Ok(())
    }

    async fn fetch_version_rows(&mut self, _sql: &str) -> MigrateResult<Vec<VersionRow>> {
        let db = self.db.lock().unwrap();
        if !db.table_created {
            return Err(MigrateError::VersionStore(
                "version table does not exist".to_string(),
            ));
        }
        Ok(db.rows.iter().rev().copied().collect())
    }

    async fn acquire_lock(&mut self, _sql: &str, _lock_id: i64) -> MigrateResult<bool> {
        if self.lock_timeouts > 0 {
            self.lock_timeouts -= 1;
            return Ok(false);
        }
        // Emulate a server-side wait: poll until the lock frees up, with a
        // bound standing in for the statement timeout.
        for _ in 0..1000 {
            {
                let mut db = self.db.lock().unwrap();
                match db.locked_by {
                    None => {
                        db.locked_by = Some(self.id);
                        db.lock_events.push(LockEvent::Acquired(self.id));
                        return Ok(true);
                    }
                    Some(holder) if holder == self.id => return Ok(true),
                    Some(_) => {}
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(false)
    }

    async fn release_lock(&mut self, _sql: &str, _lock_id: i64) -> MigrateResult<()> {
        let mut db = self.db.lock().unwrap();
        if db.locked_by == Some(self.id) {
            db.locked_by = None;
            db.lock_events.push(LockEvent::Released(self.id));
        }
        Ok(())
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        let mut db = self.db.lock().unwrap();
        self.tx_snapshot = Some(db.rows.clone());
        db.statements.push("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&mut self) -> MigrateResult<()> {
        self.tx_snapshot = None;
        self.db
            .lock()
            .unwrap()
            .statements
            .push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        let mut db = self.db.lock().unwrap();
        if let Some(snapshot) = self.tx_snapshot.take() {
            db.rows = snapshot;
        }
        db.statements.push("ROLLBACK".to_string());
        Ok(())
    }
}
