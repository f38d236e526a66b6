//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for duci_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => duci_core::Error::NotFound(msg),
            other => duci_core::Error::Store(other.to_string()),
        }
    }
}
