//! # milepost-core: Versioned SQL Migration Engine
//!
//! Applies and reverts ordered, versioned schema migrations against a
//! relational database, tracking applied versions in a bookkeeping table
//! and serializing concurrent runners with backend-native advisory locks.
//!
//! The engine is split into small pieces: [`Dialect`] generates the
//! backend-specific SQL and lock statements, [`MigrationCollection`] orders
//! migration files from disk, [`VersionStore`] reads and writes the version
//! table, [`LockCoordinator`] drives lock acquisition, and [`Migrator`]
//! composes them into the public `up`/`down`/`redo` operations.

pub mod backends;
pub mod collection;
pub mod conn;
pub mod dialect;
pub mod error;
pub mod lock;
pub mod migration;
pub mod runner;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export core types
pub use collection::{MigrationCollection, MAX_VERSION, MIN_VERSION};
pub use conn::{MigrationConn, VersionRow};
pub use dialect::{Dialect, LockStrategy};
pub use error::{MigrateError, MigrateResult};
pub use lock::{advisory_lock_id, LockCoordinator};
pub use migration::{create_migration_file, Migration};
pub use runner::{MigrationStatus, Migrator};
pub use store::{VersionStore, DEFAULT_VERSION_TABLE};
