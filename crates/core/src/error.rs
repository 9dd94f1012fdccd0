//! Error types for the migration engine
//!
//! One crate-wide error enum covers configuration, locking, version-table
//! and execution failures. `NoNextVersion` and `NoCurrentVersion` double as
//! loop-termination sentinels inside the runner; callers of the multi-step
//! operations never see them as failures.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Unrecognized dialect name at configuration time
    #[error("{name:?}: unknown dialect (expected postgres, mysql or tidb)")]
    UnknownDialect { name: String },

    /// Advisory lock could not be acquired after exhausting retries
    #[error("failed to acquire migration lock after {attempts} attempts")]
    LockFailed { attempts: u32 },

    /// Advisory lock release failed; logged and treated as non-fatal at use sites
    #[error("failed to release migration lock: {0}")]
    LockReleaseFailed(String),

    /// The current applied version has no matching migration file
    #[error("no migration with version {version}")]
    NoCurrentVersion { version: i64 },

    /// No migration with a higher (or lower, for `previous`) version exists
    #[error("no next migration version")]
    NoNextVersion,

    /// A migration's up/down SQL failed to execute
    #[error("migration {version} ({file}) failed: {message}")]
    Execution {
        version: i64,
        file: String,
        message: String,
    },

    /// Two migration files in one directory share a version number
    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },

    /// Version table could not be read or written
    #[error("version table error: {0}")]
    VersionStore(String),

    /// A migration file could not be parsed
    #[error("invalid migration file {path}: {message}")]
    InvalidMigrationFile { path: PathBuf, message: String },

    /// Underlying database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem error while scanning or writing migration files
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// True for the error kinds the multi-step loops use as their normal
    /// termination signal.
    pub fn is_loop_sentinel(&self) -> bool {
        matches!(
            self,
            MigrateError::NoNextVersion | MigrateError::NoCurrentVersion { .. }
        )
    }
}
