//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, StorageError};

/// Prefix all file objects live under.
const FILES_PREFIX: &str = "files";
/// Read size when streaming a local file into a multipart upload.
const UPLOAD_PART_SIZE: usize = 5 * 1024 * 1024;
const MAX_CONCURRENT_PARTS: usize = 4;

/// Configuration for the object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Durable references to the three objects of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRefs {
    pub base_path: String,
    pub data: String,
    pub meta: String,
    pub digest: String,
}

/// A stored payload opened for reading.
pub struct DataStream {
    pub size: u64,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for DataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStream").field("size", &self.size).finish()
    }
}

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<dyn ObjectStore>,
    base_path: String,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let (inner, base_path): (Arc<dyn ObjectStore>, String) = match &config {
            ObjectStoreConfig::Memory => (Arc::new(InMemory::new()), "memory://".to_string()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                let store = LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;
                (Arc::new(store), path.display().to_string())
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store: Arc<dyn ObjectStore> = Arc::new(
                    AmazonS3Builder::new()
                        .with_endpoint(endpoint)
                        .with_access_key_id(access_key)
                        .with_secret_access_key(secret_key)
                        .with_bucket_name(bucket)
                        .with_region(region.as_deref().unwrap_or("us-east-1"))
                        .with_allow_http(endpoint.starts_with("http://"))
                        .build()
                        .map_err(|e| StorageError::InvalidConfig(e.to_string()))?,
                );
                ensure_bucket_exists(store.as_ref(), bucket).await?;
                (store, format!("s3://{}", bucket))
            }
        };

        tracing::info!(base_path = %base_path, "object storage ready");
        Ok(Self { inner, base_path })
    }

    /// An in-memory backend, for tests and throwaway servers.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            base_path: "memory://".to_string(),
        }
    }

    fn data_path(id: &str) -> ObjectPath {
        ObjectPath::from(format!("{FILES_PREFIX}/{id}.enc"))
    }

    fn meta_path(id: &str) -> ObjectPath {
        ObjectPath::from(format!("{FILES_PREFIX}/{id}.meta"))
    }

    fn digest_path(id: &str) -> ObjectPath {
        ObjectPath::from(format!("{FILES_PREFIX}/{id}.digest"))
    }

    /// Copy a finished local file plus its metadata and digest blobs into
    /// durable storage under `id`.
    pub async fn transfer(
        &self,
        data_path: &Path,
        meta: Bytes,
        digest: Bytes,
        id: &str,
    ) -> Result<StorageRefs> {
        let data = Self::data_path(id);
        let meta_path = Self::meta_path(id);
        let digest_path = Self::digest_path(id);

        self.upload_file(data_path, &data).await?;
        self.inner.put(&meta_path, meta.into()).await?;
        self.inner.put(&digest_path, digest.into()).await?;

        tracing::debug!(id, "transferred file objects");
        Ok(StorageRefs {
            base_path: self.base_path.clone(),
            data: data.to_string(),
            meta: meta_path.to_string(),
            digest: digest_path.to_string(),
        })
    }

    async fn upload_file(&self, source: &Path, target: &ObjectPath) -> Result<()> {
        let mut file = tokio::fs::File::open(source).await?;
        let upload = self.inner.put_multipart(target).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, UPLOAD_PART_SIZE);

        // Every part is settled before finishing, so a failed part can
        // still abort the upload
        if let Err(e) = write_parts(&mut file, &mut writer).await {
            if let Err(abort) = writer.abort().await {
                tracing::warn!(%target, "failed to abort multipart upload: {}", abort);
            }
            return Err(e);
        }

        writer.finish().await?;
        Ok(())
    }

    /// Open the stored payload as a byte stream.
    pub async fn retrieve_data(&self, id: &str) -> Result<DataStream> {
        let result = self
            .inner
            .get(&Self::data_path(id))
            .await
            .map_err(|e| not_found_as(e, id))?;
        let size = result.meta.size as u64;
        let stream = result.into_stream().map_err(StorageError::from).boxed();
        Ok(DataStream { size, stream })
    }

    pub async fn retrieve_meta(&self, id: &str) -> Result<Bytes> {
        self.get_small(&Self::meta_path(id), id).await
    }

    pub async fn retrieve_digest(&self, id: &str) -> Result<Bytes> {
        self.get_small(&Self::digest_path(id), id).await
    }

    async fn get_small(&self, path: &ObjectPath, id: &str) -> Result<Bytes> {
        let result = self.inner.get(path).await.map_err(|e| not_found_as(e, id))?;
        Ok(result.bytes().await?)
    }

    /// Whether the payload object for `id` is present.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        match self.inner.head(&Self::data_path(id)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove all three objects for `id`. Missing objects are not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        for path in [
            Self::data_path(id),
            Self::meta_path(id),
            Self::digest_path(id),
        ] {
            match self.inner.delete(&path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(id, "deleted file objects");
        Ok(())
    }
}

fn not_found_as(err: object_store::Error, id: &str) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(id.to_string()),
        e => e.into(),
    }
}

/// Fail fast when the configured bucket is missing.
async fn ensure_bucket_exists(store: &dyn ObjectStore, bucket: &str) -> Result<()> {
    let prefix = ObjectPath::from("");
    let mut stream = store.list(Some(&prefix));
    match stream.try_next().await {
        Ok(_) => Ok(()),
        Err(object_store::Error::NotFound { .. }) => {
            Err(StorageError::BucketNotFound(bucket.to_string()))
        }
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("NoSuchBucket") {
                return Err(StorageError::BucketNotFound(bucket.to_string()));
            }
            Err(e.into())
        }
    }
}

async fn write_parts<R>(source: &mut R, writer: &mut WriteMultipart) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; UPLOAD_PART_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await?;
        writer.write(&buf[..n]);
    }
    writer.wait_for_capacity(0).await?;
    Ok(())
}
