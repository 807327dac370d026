use serde::Serialize;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use object_store::StorageRefs;

use super::buckets::parse_uuid;
use super::{CatalogError, Database};

/// Everything recorded about a file when its upload completes.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub bucket_id: Uuid,
    pub upload_id: String,
    pub file_uuid: Uuid,
    pub refs: StorageRefs,
    pub file_info: String,
    pub file_info_nonce: String,
    pub data_size: u64,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: Uuid,
    pub file_uuid: Uuid,
    pub refs: StorageRefs,
    pub data_size: u64,
}

/// A row of the bucket listing. Field names are the wire names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "fileUUID")]
    pub file_uuid: Uuid,
    pub enc_file_info: String,
    pub file_info_nonce: String,
}

impl Database {
    pub async fn insert_file(&self, file: &NewFile) -> Result<Uuid, CatalogError> {
        let id = Uuid::new_v4();
        let size = i64::try_from(file.data_size)
            .map_err(|_| CatalogError::Corrupt(format!("file size {} overflows", file.data_size)))?;

        sqlx::query(
            r#"
            INSERT INTO files (
                id, bucket_id, upload_id, file_uuid, base_path, data_ref, meta_ref,
                digest_ref, file_info, file_info_nonce, data_size, valid, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(file.bucket_id.to_string())
        .bind(&file.upload_id)
        .bind(file.file_uuid.to_string())
        .bind(&file.refs.base_path)
        .bind(&file.refs.data)
        .bind(&file.refs.meta)
        .bind(&file.refs.digest)
        .bind(&file.file_info)
        .bind(&file.file_info_nonce)
        .bind(size)
        .bind(OffsetDateTime::now_utc())
        .execute(&**self)
        .await?;

        Ok(id)
    }

    /// Valid files of a bucket, oldest first.
    pub async fn get_files(&self, bucket_id: Uuid) -> Result<Vec<FileListing>, CatalogError> {
        let rows = sqlx::query(
            r#"
            SELECT created_at, file_uuid, file_info, file_info_nonce
            FROM files
            WHERE bucket_id = ? AND valid = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .bind(bucket_id.to_string())
        .fetch_all(&**self)
        .await?;

        rows.into_iter()
            .map(|row| {
                let file_uuid: String = row.try_get("file_uuid")?;
                Ok(FileListing {
                    created_at: row.try_get("created_at")?,
                    file_uuid: parse_uuid(&file_uuid)?,
                    enc_file_info: row.try_get("file_info")?,
                    file_info_nonce: row.try_get("file_info_nonce")?,
                })
            })
            .collect()
    }

    /// Look up a valid file owned by `bucket_id`.
    pub async fn get_file_by_uuid(
        &self,
        bucket_id: Uuid,
        file_uuid: Uuid,
    ) -> Result<Option<FileRecord>, CatalogError> {
        let row = sqlx::query(
            r#"
            SELECT id, file_uuid, base_path, data_ref, meta_ref, digest_ref, data_size
            FROM files
            WHERE bucket_id = ? AND file_uuid = ? AND valid = TRUE
            "#,
        )
        .bind(bucket_id.to_string())
        .bind(file_uuid.to_string())
        .fetch_optional(&**self)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let stored_uuid: String = row.try_get("file_uuid")?;
        let size: i64 = row.try_get("data_size")?;
        Ok(Some(FileRecord {
            id: parse_uuid(&id)?,
            file_uuid: parse_uuid(&stored_uuid)?,
            refs: StorageRefs {
                base_path: row.try_get("base_path")?,
                data: row.try_get("data_ref")?,
                meta: row.try_get("meta_ref")?,
                digest: row.try_get("digest_ref")?,
            },
            data_size: u64::try_from(size)
                .map_err(|_| CatalogError::Corrupt(format!("negative file size {size}")))?,
        }))
    }

    /// Soft delete (or restore) a file. Rows are never removed.
    pub async fn set_file_validity(&self, file_id: Uuid, valid: bool) -> Result<(), CatalogError> {
        sqlx::query("UPDATE files SET valid = ? WHERE id = ?")
            .bind(valid)
            .bind(file_id.to_string())
            .execute(&**self)
            .await?;
        Ok(())
    }
}
