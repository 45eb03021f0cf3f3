pub mod preferences;
pub mod records;
pub mod repository;

use std::{str::FromStr, time::Duration};

use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

use crate::error::AppError;

pub use repository::{MergeStats, SyncRepository};

/// Open (creating if needed) the database at `database_url` and bring the
/// schema up to date.
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database ready at {}", database_url);

    Ok(pool)
}

/// Open a transaction that holds the write lock from its first statement.
/// A deferred transaction that reads before it writes cannot upgrade its WAL
/// snapshot once another connection has committed, and fails with
/// `SQLITE_BUSY_SNAPSHOT` instead of waiting.
pub async fn begin_immediate(db: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    db.begin_with("BEGIN IMMEDIATE").await
}

/// A private in-memory database. Every connection to `sqlite::memory:` is a
/// separate database, so the pool is pinned to a single connection that is
/// never recycled.
pub async fn connect_in_memory() -> Result<SqlitePool, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
