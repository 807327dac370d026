use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use common::prelude::BucketKey;

use super::{CatalogError, Database};

#[derive(Debug, Clone)]
pub struct BucketRecord {
    pub id: Uuid,
    pub key: BucketKey,
    pub name: String,
    pub credential_id: Vec<u8>,
    /// Serialized OPAQUE registration record.
    pub record: Vec<u8>,
    pub cipher: String,
    pub created_at: OffsetDateTime,
}

pub(super) fn parse_uuid(raw: &str) -> Result<Uuid, CatalogError> {
    Uuid::parse_str(raw).map_err(|e| CatalogError::Corrupt(format!("uuid {raw:?}: {e}")))
}

impl Database {
    /// Insert a bucket. Fails with [`CatalogError::DuplicateKey`] when the
    /// key is already taken.
    pub async fn insert_bucket(
        &self,
        key: &BucketKey,
        name: &str,
        credential_id: &[u8],
        record: &[u8],
        cipher: &str,
    ) -> Result<Uuid, CatalogError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO buckets (id, key, name, credential_id, record, cipher, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(key.as_str())
        .bind(name)
        .bind(credential_id)
        .bind(record)
        .bind(cipher)
        .bind(OffsetDateTime::now_utc())
        .execute(&**self)
        .await?;

        Ok(id)
    }

    pub async fn get_bucket(&self, key: &BucketKey) -> Result<Option<BucketRecord>, CatalogError> {
        let row = sqlx::query(
            r#"
            SELECT id, key, name, credential_id, record, cipher, created_at
            FROM buckets
            WHERE key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&**self)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let stored_key: String = row.try_get("key")?;
        Ok(Some(BucketRecord {
            id: parse_uuid(&id)?,
            key: stored_key
                .parse()
                .map_err(|e: common::prelude::BucketKeyError| CatalogError::Corrupt(e.to_string()))?,
            name: row.try_get("name")?,
            credential_id: row.try_get("credential_id")?,
            record: row.try_get("record")?,
            cipher: row.try_get("cipher")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    pub async fn get_bucket_id(&self, key: &BucketKey) -> Result<Option<Uuid>, CatalogError> {
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM buckets WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&**self)
            .await?;
        id.as_deref().map(parse_uuid).transpose()
    }
}
