//! PostgreSQL migration session

use async_trait::async_trait;
use sqlx::{Connection, Executor, PgConnection, Row};

use crate::conn::{MigrationConn, VersionRow};
use crate::error::MigrateResult;

/// A dedicated PostgreSQL session for one migration operation
pub struct PostgresConn {
    conn: PgConnection,
}

impl PostgresConn {
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MigrationConn for PostgresConn {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        // Unprepared simple-protocol execution: migration bodies may hold
        // statements the extended protocol refuses to prepare.
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
        // pg_advisory_lock blocks until granted; returning means we hold it.
        sqlx::query(sql)
            .bind(lock_id)
            .execute(&mut self.conn)
            .await?;
        Ok(true)
    }

    async fn release_lock(&mut self, sql: &str, lock_id: i64) -> MigrateResult<()> {
        sqlx::query(sql)
            .bind(lock_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        self.conn.execute("BEGIN").await?;
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
