//! MySQL/TiDB migration session

use async_trait::async_trait;
use sqlx::{Connection, Executor, MySqlConnection, Row};

use crate::conn::{MigrationConn, VersionRow};
use crate::error::MigrateResult;

/// A dedicated MySQL-protocol session for one migration operation.
///
/// TiDB speaks the same wire protocol and uses this backend unchanged.
pub struct MySqlConn {
    conn: MySqlConnection,
}

impl MySqlConn {
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        let conn = MySqlConnection::connect(url).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MigrationConn for MySqlConn {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        self.conn.execute(sql).await?;
        Ok(())
    }

    async fn insert_version(
        &mut self,
        sql: &str,
        version_id: i64,
        is_applied: bool,
    ) -> MigrateResult<()> {
        sqlx::query(sql)
            .bind(version_id)
            .bind(is_applied)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn delete_version(&mut self, sql: &str, version_id: i64) -> MigrateResult<()> {
        sqlx::query(sql)
            .bind(version_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn fetch_version_rows(&mut self, sql: &str) -> MigrateResult<Vec<VersionRow>> {
        let rows = sqlx::query(sql).fetch_all(&mut self.conn).await?;
        rows.iter()
            .map(|row| {
                Ok(VersionRow {
                    version_id: row.try_get(0)?,
                    is_applied: row.try_get(1)?,
                })
            })
            .collect()
    }

    async fn acquire_lock(&mut self, sql: &str, lock_id: i64) -> MigrateResult<bool> {
        // GET_LOCK returns 1 on success, 0 on timeout, NULL on error.
        let granted: Option<i64> = sqlx::query_scalar(sql)
            .bind(lock_id)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(granted == Some(1))
    }

    async fn release_lock(&mut self, sql: &str, lock_id: i64) -> MigrateResult<()> {
        sqlx::query(sql)
            .bind(lock_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        self.conn.execute("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&mut self) -> MigrateResult<()> {
        self.conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }
}
