//! Job repository.
//!
//! Each job is one row holding its serialized record. Every mutation reads the
//! record, changes it and writes it back inside a transaction.

use async_trait::async_trait;
use duci_core::{Job, JobId, LogLine};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::{DbError, DbResult};

#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Write an empty, unfinished record, replacing any previous one.
    async fn start(&self, id: JobId) -> DbResult<()>;

    /// Append a line. A missing record counts as empty and unfinished.
    async fn append(&self, id: JobId, line: LogLine) -> DbResult<()>;

    async fn get(&self, id: JobId) -> DbResult<Job>;

    /// Mark the job finished. Calling it again is a no-op.
    async fn finish(&self, id: JobId) -> DbResult<()>;

    async fn close(&self);
}

/// SQLite implementation of JobRepo.
#[derive(Clone)]
pub struct SqliteJobRepo {
    pool: SqlitePool,
}

impl SqliteJobRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn load(tx: &mut Transaction<'_, Sqlite>, id: JobId) -> DbResult<Option<Job>> {
    let record: Option<String> = sqlx::query_scalar("SELECT record FROM jobs WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await?;
    record
        .map(|r| serde_json::from_str(&r).map_err(DbError::from))
        .transpose()
}

async fn store(tx: &mut Transaction<'_, Sqlite>, job: &Job) -> DbResult<()> {
    let record = serde_json::to_string(job)?;
    sqlx::query(
        r#"
        INSERT INTO jobs (id, record) VALUES (?1, ?2)
        ON CONFLICT(id) DO UPDATE SET record = excluded.record
        "#,
    )
    .bind(job.id.to_string())
    .bind(record)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl JobRepo for SqliteJobRepo {
    async fn start(&self, id: JobId) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        store(&mut tx, &Job::new(id)).await?;
        tx.commit().await?;
        debug!(job_id = %id, "Started job record");
        Ok(())
    }

    async fn append(&self, id: JobId, line: LogLine) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut job = load(&mut tx, id).await?.unwrap_or_else(|| Job::new(id));
        job.append(line);
        store(&mut tx, &job).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> DbResult<Job> {
        let record: String = sqlx::query_scalar("SELECT record FROM jobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        Ok(serde_json::from_str(&record)?)
    }

    async fn finish(&self, id: JobId) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut job = load(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        job.finish();
        store(&mut tx, &job).await?;
        tx.commit().await?;
        debug!(job_id = %id, lines = job.stream.len(), "Finished job record");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
