//! milepost: apply and revert versioned SQL migrations
//!
//! Connection details come from flags or the `MILEPOST_DRIVER` /
//! `MILEPOST_DBSTRING` environment variables; the engine itself never
//! touches the environment.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use milepost_core::{backends, create_migration_file, Dialect, Migrator};

#[derive(Parser)]
#[command(
    name = "milepost",
    version,
    about = "Versioned SQL schema migrations with cross-process locking"
)]
struct Cli {
    /// Database backend: postgres, mysql or tidb
    #[arg(long, env = "MILEPOST_DRIVER", default_value = "postgres", global = true)]
    driver: String,

    /// Database connection string
    #[arg(long, env = "MILEPOST_DBSTRING", global = true)]
    dbstring: Option<String>,

    /// Directory containing migration files
    #[arg(long, default_value = "migrations", global = true)]
    dir: PathBuf,

    /// Name of the version bookkeeping table
    #[arg(long, default_value = milepost_core::DEFAULT_VERSION_TABLE, global = true)]
    table: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Apply the next pending migration only
    UpByOne,
    /// Apply pending migrations up to and including VERSION
    UpTo { version: i64 },
    /// Roll back the most recent migration
    Down,
    /// Roll back migrations until VERSION is current
    DownTo { version: i64 },
    /// Roll back and re-apply the current migration
    Redo,
    /// Show applied and pending migrations
    Status,
    /// Print the current version
    Version,
    /// Create a new timestamped migration file
    Create { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let dialect = Dialect::from_name(&cli.driver)?;

    // `create` works without a database.
    if let Command::Create { name } = &cli.command {
        let path = create_migration_file(&cli.dir, name)?;
        println!("created {}", path.display());
        return Ok(());
    }

    let dbstring = cli
        .dbstring
        .context("provide a connection string via --dbstring or MILEPOST_DBSTRING")?;
    let mut conn = backends::connect(dialect, &dbstring).await?;
    let migrator = Migrator::with_table(dialect, &cli.dir, &cli.table);

    match cli.command {
        Command::Up => {
            migrator.up(conn.as_mut()).await?;
            println!("migrated to version {}", migrator.version(conn.as_mut()).await?);
        }
        Command::UpByOne => {
            migrator.up_by_one(conn.as_mut()).await?;
            println!("migrated to version {}", migrator.version(conn.as_mut()).await?);
        }
        Command::UpTo { version } => {
            migrator.up_to(conn.as_mut(), version).await?;
            println!("migrated to version {}", migrator.version(conn.as_mut()).await?);
        }
        Command::Down => {
            migrator.down(conn.as_mut()).await?;
            println!("rolled back to version {}", migrator.version(conn.as_mut()).await?);
        }
        Command::DownTo { version } => {
            migrator.down_to(conn.as_mut(), version).await?;
            println!("rolled back to version {}", migrator.version(conn.as_mut()).await?);
        }
        Command::Redo => {
            migrator.redo(conn.as_mut()).await?;
            println!("redid version {}", migrator.version(conn.as_mut()).await?);
        }
        Command::Status => {
            for entry in migrator.status(conn.as_mut()).await? {
                let state = if entry.applied { "applied" } else { "pending" };
                println!("{:>14}  {:<8} {}", entry.version, state, entry.source.display());
            }
        }
        Command::Version => {
            println!("{}", migrator.version(conn.as_mut()).await?);
        }
        Command::Create { .. } => unreachable!("handled above"),
    }

    Ok(())
}
