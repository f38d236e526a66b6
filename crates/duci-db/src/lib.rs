//! Job and log store for duci.
//!
//! Provides the job repository trait, its SQLite implementation, an observer
//! that records executions into the store, and a polling log tail.

pub mod error;
pub mod recorder;
pub mod repo;
pub mod tail;

pub use error::{DbError, DbResult};
pub use recorder::StoreRecorder;
pub use repo::*;
pub use tail::LogTail;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// Create the store's connection pool.
///
/// The pool holds exactly one long-lived connection, so every operation on the
/// store is serialized and `sqlite::memory:` databases survive for the pool's
/// lifetime.
pub async fn create_pool(database_url: &str) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Open a store and bring its schema up to date.
pub async fn open(database_url: &str) -> DbResult<SqliteJobRepo> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    Ok(SqliteJobRepo::new(pool))
}
