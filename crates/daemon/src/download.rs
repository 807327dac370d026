//! Ordered download protocol: `init -> data -> meta -> digest`.
//!
//! A client must take the whole encrypted payload before it may ask for
//! the metadata, and the metadata before the digest. Each transition is a
//! compare-and-swap on the stored state, so concurrent calls cannot both
//! advance from the same stage. The payload transfer claims the download
//! (`init -> streaming`) before any byte is sent and settles the claim
//! when the last byte is produced.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream};
use futures::{FutureExt, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::prelude::BucketKey;
use object_store::Storage;

use crate::database::{CatalogError, Database, FileRecord};
use crate::ephemeral::{self, DynEphemeralStore, EphemeralError, DOWNLOAD_PREFIX};
use crate::upload::{StoredDigest, StoredMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStage {
    Init,
    Streaming,
    Data,
    Meta,
    Digest,
}

impl DownloadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStage::Init => "init",
            DownloadStage::Streaming => "streaming",
            DownloadStage::Data => "data",
            DownloadStage::Meta => "meta",
            DownloadStage::Digest => "digest",
        }
    }
}

impl std::fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DownloadState {
    file_uuid: Uuid,
    owner: BucketKey,
    stage: DownloadStage,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("file or download not found")]
    NotFound,
    #[error("download is at stage {actual}, expected {expected}")]
    StageViolation {
        expected: DownloadStage,
        actual: DownloadStage,
    },
    #[error("wrote {written} of {expected} bytes")]
    ShortWrite { expected: u64, written: u64 },
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("catalog failure: {0}")]
    Catalog(#[from] CatalogError),
    #[error("ephemeral store error: {0}")]
    Store(#[from] EphemeralError),
}

/// The payload of a download, streamed once.
pub struct DataDownload {
    pub size: u64,
    pub stream: BoxStream<'static, Result<Bytes, DownloadError>>,
}

pub struct Downloads {
    store: DynEphemeralStore,
    storage: Storage,
    database: Database,
    ttl: Duration,
}

fn state_key(download_id: &str) -> String {
    format!("{DOWNLOAD_PREFIX}{download_id}")
}

impl Downloads {
    pub fn new(store: DynEphemeralStore, storage: Storage, database: Database, ttl: Duration) -> Self {
        Self {
            store,
            storage,
            database,
            ttl,
        }
    }

    async fn file_record(
        &self,
        owner: &BucketKey,
        file_uuid: Uuid,
    ) -> Result<FileRecord, DownloadError> {
        let bucket_id = self
            .database
            .get_bucket_id(owner)
            .await?
            .ok_or(DownloadError::NotFound)?;
        self.database
            .get_file_by_uuid(bucket_id, file_uuid)
            .await?
            .ok_or(DownloadError::NotFound)
    }

    /// Start a download of a file the bucket owns. Returns the download id.
    pub async fn init(&self, owner: &BucketKey, file_uuid: Uuid) -> Result<String, DownloadError> {
        self.file_record(owner, file_uuid).await?;

        let download_id = Uuid::new_v4().to_string();
        let state = DownloadState {
            file_uuid,
            owner: owner.clone(),
            stage: DownloadStage::Init,
        };
        ephemeral::set_json(self.store.as_ref(), &state_key(&download_id), &state, self.ttl)
            .await?;

        tracing::debug!(download_id, %file_uuid, "download started");
        Ok(download_id)
    }

    /// Load a download and check it is for this bucket and file and sits
    /// at `expected`.
    async fn load(
        &self,
        owner: &BucketKey,
        download_id: &str,
        file_uuid: Uuid,
        expected: DownloadStage,
    ) -> Result<DownloadState, DownloadError> {
        let state: DownloadState = ephemeral::get_json(self.store.as_ref(), &state_key(download_id))
            .await?
            .ok_or(DownloadError::NotFound)?;
        if &state.owner != owner || state.file_uuid != file_uuid {
            return Err(DownloadError::NotFound);
        }
        if state.stage != expected {
            return Err(DownloadError::StageViolation {
                expected,
                actual: state.stage,
            });
        }
        Ok(state)
    }

    async fn advance(
        &self,
        download_id: &str,
        current: &DownloadState,
        to: DownloadStage,
    ) -> Result<(), DownloadError> {
        advance(self.store.as_ref(), download_id, current, to, self.ttl).await
    }

    /// Stream the encrypted payload. The download is claimed before the
    /// stream is returned, so a concurrent call sees `streaming` and is
    /// refused. The claim becomes `data` in the same poll that yields the
    /// final byte; a stream that is dropped or cut short hands the download
    /// back at `init`.
    pub async fn data(
        &self,
        owner: &BucketKey,
        download_id: &str,
        file_uuid: Uuid,
    ) -> Result<DataDownload, DownloadError> {
        let state = self
            .load(owner, download_id, file_uuid, DownloadStage::Init)
            .await?;
        let record = self.file_record(owner, file_uuid).await?;

        let stored = self
            .storage
            .retrieve_data(&file_uuid.to_string())
            .await
            .map_err(|e| DownloadError::Storage(e.to_string()))?;
        if stored.size != record.data_size {
            return Err(DownloadError::ShortWrite {
                expected: record.data_size,
                written: stored.size,
            });
        }

        self.advance(download_id, &state, DownloadStage::Streaming)
            .await?;
        let claim = StageClaim {
            store: self.store.clone(),
            download_id: download_id.to_string(),
            state: DownloadState {
                stage: DownloadStage::Streaming,
                ..state
            },
            ttl: self.ttl,
        };

        let expected = record.data_size;
        if expected == 0 {
            if let Err(e) = claim.commit().await {
                claim.release();
                return Err(e);
            }
            return Ok(DataDownload {
                size: 0,
                stream: stream::empty().boxed(),
            });
        }

        let inner = stored
            .stream
            .map_err(|e| DownloadError::Storage(e.to_string()))
            .boxed();
        Ok(DataDownload {
            size: expected,
            stream: PayloadStream {
                inner,
                expected,
                written: 0,
                progress: Progress::Sending,
                claim: Some(claim),
            }
            .boxed(),
        })
    }

    pub async fn meta(
        &self,
        owner: &BucketKey,
        download_id: &str,
        file_uuid: Uuid,
    ) -> Result<StoredMeta, DownloadError> {
        let state = self
            .load(owner, download_id, file_uuid, DownloadStage::Data)
            .await?;
        let raw = self
            .storage
            .retrieve_meta(&file_uuid.to_string())
            .await
            .map_err(|e| DownloadError::Storage(e.to_string()))?;
        let meta: StoredMeta =
            serde_json::from_slice(&raw).map_err(|e| DownloadError::Storage(e.to_string()))?;

        self.advance(download_id, &state, DownloadStage::Meta).await?;
        Ok(meta)
    }

    pub async fn digest(
        &self,
        owner: &BucketKey,
        download_id: &str,
        file_uuid: Uuid,
    ) -> Result<StoredDigest, DownloadError> {
        let state = self
            .load(owner, download_id, file_uuid, DownloadStage::Meta)
            .await?;
        let raw = self
            .storage
            .retrieve_digest(&file_uuid.to_string())
            .await
            .map_err(|e| DownloadError::Storage(e.to_string()))?;
        let digest: StoredDigest =
            serde_json::from_slice(&raw).map_err(|e| DownloadError::Storage(e.to_string()))?;

        self.advance(download_id, &state, DownloadStage::Digest).await?;
        Ok(digest)
    }
}

async fn advance(
    store: &dyn ephemeral::EphemeralStore,
    download_id: &str,
    current: &DownloadState,
    to: DownloadStage,
    ttl: Duration,
) -> Result<(), DownloadError> {
    let expected = serde_json::to_vec(current).map_err(EphemeralError::from)?;
    let next = DownloadState {
        stage: to,
        ..current.clone()
    };
    let swapped = store
        .compare_and_swap(
            &state_key(download_id),
            &expected,
            serde_json::to_vec(&next).map_err(EphemeralError::from)?,
            ttl,
        )
        .await?;

    if !swapped {
        // Another request advanced it first
        return Err(DownloadError::StageViolation {
            expected: current.stage,
            actual: to,
        });
    }
    tracing::debug!(download_id, stage = %to, "download advanced");
    Ok(())
}

/// Holds a download at `streaming` on behalf of one payload transfer.
struct StageClaim {
    store: DynEphemeralStore,
    download_id: String,
    state: DownloadState,
    ttl: Duration,
}

impl StageClaim {
    fn commit(&self) -> BoxFuture<'static, Result<(), DownloadError>> {
        let store = self.store.clone();
        let download_id = self.download_id.clone();
        let state = self.state.clone();
        let ttl = self.ttl;
        async move {
            advance(store.as_ref(), &download_id, &state, DownloadStage::Data, ttl).await
        }
        .boxed()
    }

    fn release(self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(download_id = %self.download_id, "no runtime to release download");
            return;
        };
        handle.spawn(async move {
            let result = advance(
                self.store.as_ref(),
                &self.download_id,
                &self.state,
                DownloadStage::Init,
                self.ttl,
            )
            .await;
            if let Err(e) = result {
                tracing::warn!(download_id = %self.download_id, "failed to release download: {}", e);
            }
        });
    }
}

enum Progress {
    Sending,
    Committing {
        last: Bytes,
        commit: BoxFuture<'static, Result<(), DownloadError>>,
    },
    Finished,
}

/// Counts payload bytes and settles the stage claim before yielding the
/// final chunk. Nothing is expected to poll it after that chunk.
struct PayloadStream {
    inner: BoxStream<'static, Result<Bytes, DownloadError>>,
    expected: u64,
    written: u64,
    progress: Progress,
    claim: Option<StageClaim>,
}

impl Stream for PayloadStream {
    type Item = Result<Bytes, DownloadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match &mut this.progress {
                Progress::Sending => match ready!(this.inner.poll_next_unpin(cx)) {
                    Some(Ok(chunk)) => {
                        this.written += chunk.len() as u64;
                        if this.written < this.expected {
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                        if this.written > this.expected {
                            this.progress = Progress::Finished;
                            return Poll::Ready(Some(Err(DownloadError::Storage(format!(
                                "object holds more than the recorded {} bytes",
                                this.expected
                            )))));
                        }
                        let Some(claim) = this.claim.as_ref() else {
                            this.progress = Progress::Finished;
                            return Poll::Ready(Some(Ok(chunk)));
                        };
                        this.progress = Progress::Committing {
                            last: chunk,
                            commit: claim.commit(),
                        };
                    }
                    Some(Err(e)) => {
                        this.progress = Progress::Finished;
                        return Poll::Ready(Some(Err(e)));
                    }
                    None => {
                        this.progress = Progress::Finished;
                        tracing::warn!(
                            expected = this.expected,
                            written = this.written,
                            "download payload cut short"
                        );
                        return Poll::Ready(Some(Err(DownloadError::ShortWrite {
                            expected: this.expected,
                            written: this.written,
                        })));
                    }
                },
                Progress::Committing { last, commit } => {
                    let result = ready!(commit.as_mut().poll(cx));
                    let last = std::mem::take(last);
                    this.progress = Progress::Finished;
                    return Poll::Ready(Some(result.map(|()| {
                        this.claim = None;
                        last
                    })));
                }
                Progress::Finished => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            claim.release();
        }
    }
}
