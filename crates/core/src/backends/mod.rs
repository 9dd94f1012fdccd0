//! sqlx-backed implementations of [`MigrationConn`]
//!
//! Postgres gets its own connection type; MySQL and TiDB share the MySQL
//! wire protocol and therefore the MySQL backend.

pub mod mysql;
pub mod postgres;

pub use mysql::MySqlConn;
pub use postgres::PostgresConn;

use crate::conn::MigrationConn;
use crate::dialect::Dialect;
use crate::error::MigrateResult;

/// Open a dedicated migration session for the given backend.
pub async fn connect(dialect: Dialect, url: &str) -> MigrateResult<Box<dyn MigrationConn>> {
    match dialect {
        Dialect::Postgres => Ok(Box::new(PostgresConn::connect(url).await?)),
        Dialect::MySql | Dialect::TiDb => Ok(Box::new(MySqlConn::connect(url).await?)),
    }
}
