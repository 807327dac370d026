//! Chunked uploads: planning, chunk intake and final reassembly.

mod staging;

use std::collections::BTreeSet;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::crypto::metadata_checksum;
use common::prelude::{BucketKey, PlannerConfig};
use common::transfer::plan::PlanError;
use object_store::Storage;

use crate::database::{CatalogError, Database, NewFile};
use crate::ephemeral::{
    self, DynEphemeralStore, EphemeralError, UPLOAD_CLAIM_PREFIX, UPLOAD_PARTS_PREFIX,
    UPLOAD_PLAN_PREFIX,
};

pub use staging::{AssembleError, Staging};

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub planner: PlannerConfig,
    /// Lifetime of an idle upload; refreshed by every accepted chunk.
    pub ttl: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPlan {
    pub upload_id: Uuid,
    pub owner: BucketKey,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub parallel_conns: u64,
    pub file_size: u64,
}

/// The client's declarations when it finishes an upload.
#[derive(Debug, Clone)]
pub struct CompleteUpload {
    pub upload_id: String,
    pub enc_file_info: String,
    pub enc_file_info_nonce: String,
    /// Encrypted metadata blob, base64.
    pub metadata: String,
    pub meta_nonce: String,
    pub data_checksum: String,
    pub meta_checksum: String,
}

/// Metadata object kept next to the payload in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMeta {
    pub enc_meta: String,
    pub meta_nonce: String,
}

/// Digest object kept next to the payload in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDigest {
    pub data_checksum: String,
    pub meta_checksum: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error("unknown upload")]
    UnknownUpload,
    #[error("upload incomplete: {received} of {expected} chunks received")]
    IncompleteUpload { received: u64, expected: u64 },
    #[error("chunk {0} is missing")]
    MissingChunk(u64),
    #[error("chunk {index} could not be read")]
    ChunkRead { index: u64 },
    #[error("integrity check failed: {0}")]
    IntegrityMismatch(&'static str),
    #[error("cannot plan upload: {0}")]
    Plan(#[from] PlanError),
    #[error("staging io error: {0}")]
    Staging(#[from] std::io::Error),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("ephemeral store error: {0}")]
    Store(#[from] EphemeralError),
}

pub struct Uploads {
    store: DynEphemeralStore,
    storage: Storage,
    database: Database,
    staging: Staging,
    config: UploadConfig,
}

fn plan_key(upload_id: Uuid) -> String {
    format!("{UPLOAD_PLAN_PREFIX}{upload_id}")
}

fn parts_key(upload_id: Uuid) -> String {
    format!("{UPLOAD_PARTS_PREFIX}{upload_id}")
}

fn claim_key(upload_id: Uuid) -> String {
    format!("{UPLOAD_CLAIM_PREFIX}{upload_id}")
}

impl Uploads {
    pub fn new(
        store: DynEphemeralStore,
        storage: Storage,
        database: Database,
        staging: Staging,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            storage,
            database,
            staging,
            config,
        }
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Plan a new upload and remember the plan under a fresh id.
    pub async fn init(
        &self,
        owner: &BucketKey,
        up_speed_mbps: f32,
        file_size: u64,
    ) -> Result<UploadPlan, UploadError> {
        let shape = self.config.planner.plan(up_speed_mbps, file_size)?;
        let plan = UploadPlan {
            upload_id: Uuid::new_v4(),
            owner: owner.clone(),
            chunk_size: shape.chunk_size,
            total_chunks: shape.total_chunks,
            parallel_conns: shape.parallel_conns,
            file_size,
        };

        ephemeral::set_json(
            self.store.as_ref(),
            &plan_key(plan.upload_id),
            &plan,
            self.config.ttl,
        )
        .await?;

        tracing::info!(
            upload_id = %plan.upload_id,
            bucket = %owner,
            file_size,
            chunk_size = plan.chunk_size,
            total_chunks = plan.total_chunks,
            "upload planned"
        );
        Ok(plan)
    }

    /// Plans are only visible to the bucket that created them.
    async fn load_plan(
        &self,
        owner: &BucketKey,
        upload_id: &str,
    ) -> Result<Option<UploadPlan>, UploadError> {
        let Ok(upload_id) = Uuid::parse_str(upload_id) else {
            return Ok(None);
        };
        let plan: Option<UploadPlan> =
            ephemeral::get_json(self.store.as_ref(), &plan_key(upload_id)).await?;
        Ok(plan.filter(|plan| &plan.owner == owner))
    }

    pub async fn accept_chunk(
        &self,
        owner: &BucketKey,
        upload_id: &str,
        index: u64,
        data: Bytes,
    ) -> Result<(), UploadError> {
        let plan = self
            .load_plan(owner, upload_id)
            .await?
            .ok_or_else(|| UploadError::InvalidUpload("unknown upload id".into()))?;

        if index >= plan.total_chunks {
            return Err(UploadError::InvalidUpload(format!(
                "chunk index {index} out of range 0..{}",
                plan.total_chunks
            )));
        }
        if data.len() as u64 > plan.chunk_size {
            return Err(UploadError::InvalidUpload(format!(
                "chunk of {} bytes exceeds planned chunk size {}",
                data.len(),
                plan.chunk_size
            )));
        }

        self.staging
            .write_chunk(plan.upload_id, index, &data)
            .await?;
        self.store
            .set_add(&parts_key(plan.upload_id), &index.to_string(), self.config.ttl)
            .await?;
        self.store
            .expire(&plan_key(plan.upload_id), self.config.ttl)
            .await?;

        tracing::debug!(upload_id = %plan.upload_id, index, bytes = data.len(), "chunk accepted");
        Ok(())
    }

    /// Reassemble, verify, store and register an upload. Returns the new
    /// file's uuid.
    pub async fn complete(
        &self,
        owner: &BucketKey,
        request: CompleteUpload,
    ) -> Result<Uuid, UploadError> {
        let plan = self
            .load_plan(owner, &request.upload_id)
            .await?
            .ok_or(UploadError::UnknownUpload)?;
        let upload_id = plan.upload_id;

        if !self
            .store
            .set_if_absent(&claim_key(upload_id), Vec::new(), self.config.ttl)
            .await?
        {
            return Err(UploadError::InvalidUpload(
                "upload is already being completed".into(),
            ));
        }

        let result = self.finish_claimed(owner, &plan, request).await;

        match &result {
            Ok(file_uuid) => {
                self.staging.cleanup(upload_id).await;
                self.store.delete(&plan_key(upload_id)).await?;
                self.store.delete(&parts_key(upload_id)).await?;
                self.store.delete(&claim_key(upload_id)).await?;
                tracing::info!(%upload_id, %file_uuid, "upload completed");
            }
            Err(e) => {
                self.staging.discard_final(upload_id).await;
                self.store.delete(&claim_key(upload_id)).await?;
                tracing::warn!(%upload_id, "upload completion failed: {}", e);
            }
        }
        result
    }

    async fn finish_claimed(
        &self,
        owner: &BucketKey,
        plan: &UploadPlan,
        request: CompleteUpload,
    ) -> Result<Uuid, UploadError> {
        let upload_id = plan.upload_id;

        // One snapshot of the part set decides completeness
        let members = self
            .store
            .set_members(&parts_key(upload_id))
            .await?
            .unwrap_or_default();
        let received: BTreeSet<u64> = members.iter().filter_map(|m| m.parse().ok()).collect();
        if received.is_empty() {
            return Err(UploadError::IncompleteUpload {
                received: 0,
                expected: plan.total_chunks,
            });
        }
        if let Some(missing) = (0..plan.total_chunks).find(|i| !received.contains(i)) {
            return Err(UploadError::MissingChunk(missing));
        }

        let file_uuid = Uuid::new_v4();
        let assembled = self
            .staging
            .assemble(upload_id, plan.total_chunks, file_uuid)
            .await
            .map_err(|e| match e {
                AssembleError::ChunkRead { index, source } => {
                    tracing::error!(%upload_id, index, "chunk read failed: {}", source);
                    UploadError::ChunkRead { index }
                }
                AssembleError::Write(e) => UploadError::Staging(e),
            })?;

        if assembled.size != plan.file_size {
            return Err(UploadError::IntegrityMismatch("file size"));
        }
        if assembled.checksum != request.data_checksum {
            return Err(UploadError::IntegrityMismatch("data checksum"));
        }
        let meta_checksum = metadata_checksum(&request.metadata)
            .map_err(|_| UploadError::IntegrityMismatch("metadata encoding"))?;
        if meta_checksum != request.meta_checksum {
            return Err(UploadError::IntegrityMismatch("metadata checksum"));
        }

        let meta_blob = serde_json::to_vec(&StoredMeta {
            enc_meta: request.metadata,
            meta_nonce: request.meta_nonce,
        })
        .map_err(|e| UploadError::Persistence(e.to_string()))?;
        let digest_blob = serde_json::to_vec(&StoredDigest {
            data_checksum: request.data_checksum,
            meta_checksum: request.meta_checksum,
        })
        .map_err(|e| UploadError::Persistence(e.to_string()))?;

        let refs = self
            .storage
            .transfer(
                &assembled.path,
                Bytes::from(meta_blob),
                Bytes::from(digest_blob),
                &file_uuid.to_string(),
            )
            .await
            .map_err(|e| {
                tracing::error!(%upload_id, "storage transfer failed: {}", e);
                UploadError::Persistence(e.to_string())
            })?;

        let registered = async {
            let bucket_id = self
                .database
                .get_bucket_id(owner)
                .await?
                .ok_or_else(|| CatalogError::Corrupt("owner bucket vanished".into()))?;
            self.database
                .insert_file(&NewFile {
                    bucket_id,
                    upload_id: upload_id.to_string(),
                    file_uuid,
                    refs,
                    file_info: request.enc_file_info,
                    file_info_nonce: request.enc_file_info_nonce,
                    data_size: assembled.size,
                })
                .await
        }
        .await;

        if let Err(e) = registered {
            tracing::error!(%upload_id, %file_uuid, "catalog insert failed, removing stored objects: {}", e);
            if let Err(cleanup) = self.storage.delete(&file_uuid.to_string()).await {
                tracing::error!(%file_uuid, "orphaned stored objects: {}", cleanup);
            }
            return Err(UploadError::Persistence(e.to_string()));
        }

        Ok(file_uuid)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use common::crypto::sha256_base64;

    use super::*;
    use crate::ephemeral::MemoryStore;

    struct Fixture {
        uploads: Uploads,
        database: Database,
        owner: BucketKey,
        _dir: tempfile::TempDir,
    }

    async fn fixture(planner: PlannerConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::connect(None).await.unwrap();
        let owner = BucketKey::generate();
        database
            .insert_bucket(&owner, "test", &[0], b"record", "cipher")
            .await
            .unwrap();
        let uploads = Uploads::new(
            Arc::new(MemoryStore::new()),
            Storage::memory(),
            database.clone(),
            Staging::new(dir.path()),
            UploadConfig {
                planner,
                ttl: Duration::from_secs(60),
            },
        );
        Fixture {
            uploads,
            database,
            owner,
            _dir: dir,
        }
    }

    fn small_chunks() -> PlannerConfig {
        PlannerConfig {
            base_chunk_size: 4,
            ..PlannerConfig::default()
        }
    }

    fn completion(upload_id: Uuid, data: &[u8]) -> CompleteUpload {
        let metadata = STANDARD.encode(b"encrypted meta");
        CompleteUpload {
            upload_id: upload_id.to_string(),
            enc_file_info: "info".into(),
            enc_file_info_nonce: "info-nonce".into(),
            meta_checksum: metadata_checksum(&metadata).unwrap(),
            metadata,
            meta_nonce: "meta-nonce".into(),
            data_checksum: sha256_base64(data),
        }
    }

    async fn send_all(f: &Fixture, plan: &UploadPlan, data: &[u8]) {
        for (i, chunk) in data.chunks(plan.chunk_size as usize).enumerate() {
            f.uploads
                .accept_chunk(
                    &f.owner,
                    &plan.upload_id.to_string(),
                    i as u64,
                    Bytes::copy_from_slice(chunk),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_missing_chunk_rejected() {
        let f = fixture(small_chunks()).await;
        let data = b"0123456789abcdefghij";
        let plan = f.uploads.init(&f.owner, 1.0, data.len() as u64).await.unwrap();
        assert_eq!(plan.total_chunks, 5);

        for (i, chunk) in data.chunks(4).enumerate() {
            if i == 2 {
                continue;
            }
            f.uploads
                .accept_chunk(&f.owner, &plan.upload_id.to_string(), i as u64, Bytes::copy_from_slice(chunk))
                .await
                .unwrap();
        }

        assert!(matches!(
            f.uploads.complete(&f.owner, completion(plan.upload_id, data)).await,
            Err(UploadError::MissingChunk(2))
        ));

        // Retry after supplying the chunk succeeds
        f.uploads
            .accept_chunk(&f.owner, &plan.upload_id.to_string(), 2, Bytes::from_static(b"89ab"))
            .await
            .unwrap();
        f.uploads
            .complete(&f.owner, completion(plan.upload_id, data))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_complete_registers_one_file() {
        let f = fixture(small_chunks()).await;
        let data = b"0123456789abcdefghij";
        let plan = f.uploads.init(&f.owner, 1.0, data.len() as u64).await.unwrap();
        send_all(&f, &plan, data).await;

        let file_uuid = f
            .uploads
            .complete(&f.owner, completion(plan.upload_id, data))
            .await
            .unwrap();

        let bucket_id = f.database.get_bucket_id(&f.owner).await.unwrap().unwrap();
        let files = f.database.get_files(bucket_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_uuid, file_uuid);
        let record = f
            .database
            .get_file_by_uuid(bucket_id, file_uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.data_size, data.len() as u64);

        // The plan is gone; replays see an unknown upload
        assert!(matches!(
            f.uploads.complete(&f.owner, completion(plan.upload_id, data)).await,
            Err(UploadError::UnknownUpload)
        ));
        assert!(!f.uploads.staging().chunk_path(plan.upload_id, 0).exists());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let f = fixture(small_chunks()).await;
        let data = b"abcdefgh";
        let plan = f.uploads.init(&f.owner, 1.0, data.len() as u64).await.unwrap();
        let id = plan.upload_id.to_string();

        f.uploads.accept_chunk(&f.owner, &id, 0, Bytes::from_static(b"zzzz")).await.unwrap();
        f.uploads.accept_chunk(&f.owner, &id, 1, Bytes::from_static(b"efgh")).await.unwrap();
        f.uploads.accept_chunk(&f.owner, &id, 0, Bytes::from_static(b"abcd")).await.unwrap();

        let parts = f
            .uploads
            .store
            .set_members(&parts_key(plan.upload_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parts.len(), 2);

        f.uploads
            .complete(&f.owner, completion(plan.upload_id, data))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_integrity_mismatch_creates_no_record() {
        let f = fixture(small_chunks()).await;
        let data = b"abcdefgh";
        let plan = f.uploads.init(&f.owner, 1.0, data.len() as u64).await.unwrap();
        send_all(&f, &plan, data).await;

        let mut bad_data = completion(plan.upload_id, data);
        bad_data.data_checksum = sha256_base64(b"something else");
        assert!(matches!(
            f.uploads.complete(&f.owner, bad_data).await,
            Err(UploadError::IntegrityMismatch("data checksum"))
        ));

        let mut bad_meta = completion(plan.upload_id, data);
        bad_meta.meta_checksum = sha256_base64(b"nope");
        assert!(matches!(
            f.uploads.complete(&f.owner, bad_meta).await,
            Err(UploadError::IntegrityMismatch("metadata checksum"))
        ));

        let bucket_id = f.database.get_bucket_id(&f.owner).await.unwrap().unwrap();
        assert!(f.database.get_files(bucket_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_file_fails_size_check() {
        let f = fixture(small_chunks()).await;
        let plan = f.uploads.init(&f.owner, 1.0, 8).await.unwrap();
        let id = plan.upload_id.to_string();
        f.uploads.accept_chunk(&f.owner, &id, 0, Bytes::from_static(b"abcd")).await.unwrap();
        f.uploads.accept_chunk(&f.owner, &id, 1, Bytes::from_static(b"ef")).await.unwrap();

        assert!(matches!(
            f.uploads.complete(&f.owner, completion(plan.upload_id, b"abcdef")).await,
            Err(UploadError::IntegrityMismatch("file size"))
        ));
    }

    #[tokio::test]
    async fn test_chunk_validation() {
        let f = fixture(small_chunks()).await;
        let plan = f.uploads.init(&f.owner, 1.0, 8).await.unwrap();
        let id = plan.upload_id.to_string();

        assert!(matches!(
            f.uploads.accept_chunk(&f.owner, "not-a-uuid", 0, Bytes::new()).await,
            Err(UploadError::InvalidUpload(_))
        ));
        assert!(matches!(
            f.uploads.accept_chunk(&f.owner, &id, 2, Bytes::new()).await,
            Err(UploadError::InvalidUpload(_))
        ));
        assert!(matches!(
            f.uploads.accept_chunk(&f.owner, &id, 0, Bytes::from_static(b"too long")).await,
            Err(UploadError::InvalidUpload(_))
        ));

        let stranger = BucketKey::generate();
        assert!(matches!(
            f.uploads.accept_chunk(&stranger, &id, 0, Bytes::from_static(b"abcd")).await,
            Err(UploadError::InvalidUpload(_))
        ));
    }

    #[tokio::test]
    async fn test_nothing_received_is_incomplete() {
        let f = fixture(small_chunks()).await;
        let plan = f.uploads.init(&f.owner, 1.0, 8).await.unwrap();
        assert!(matches!(
            f.uploads.complete(&f.owner, completion(plan.upload_id, b"abcdefgh")).await,
            Err(UploadError::IncompleteUpload { received: 0, expected: 2 })
        ));
    }
}
