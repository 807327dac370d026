mod buckets;
mod files;
mod sqlite;

use std::ops::Deref;
use std::path::Path;

use sqlx::SqlitePool;

pub use buckets::BucketRecord;
pub use files::{FileListing, FileRecord, NewFile};

/// The catalog of buckets and files.
#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    /// Open the catalog at `path`, or a private in-memory catalog when no
    /// path is given. Migrations run before the handle is returned.
    pub async fn connect(path: Option<&Path>) -> Result<Self, DatabaseSetupError> {
        let pool = match path {
            Some(path) => sqlite::connect_sqlite(path).await?,
            None => sqlite::connect_in_memory().await?,
        };
        sqlite::migrate_sqlite(&pool).await?;
        Ok(Database::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("unable to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("a bucket with this key already exists")]
    DuplicateKey,
    #[error("stored row is malformed: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => CatalogError::DuplicateKey,
            _ => CatalogError::Sqlx(err),
        }
    }
}
