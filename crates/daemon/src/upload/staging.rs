//! Local working area for uploads in flight.
//!
//! ```text
//! {root}/parts/{upload_id}/chunk_{index}.part
//! {root}/final/{upload_id}/{file_uuid}.data
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use common::crypto::StreamingChecksum;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("failed to read chunk {index}: {source}")]
    ChunkRead { index: u64, source: io::Error },
    #[error("failed to write assembled file: {0}")]
    Write(#[from] io::Error),
}

/// The result of concatenating every chunk of an upload.
#[derive(Debug)]
pub struct Assembled {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct Staging {
    root: PathBuf,
}

impl Staging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn parts_dir(&self, upload_id: Uuid) -> PathBuf {
        self.root.join("parts").join(upload_id.to_string())
    }

    fn final_dir(&self, upload_id: Uuid) -> PathBuf {
        self.root.join("final").join(upload_id.to_string())
    }

    pub fn chunk_path(&self, upload_id: Uuid, index: u64) -> PathBuf {
        self.parts_dir(upload_id).join(format!("chunk_{index}.part"))
    }

    /// Write a chunk, replacing any earlier bytes for the same index. The
    /// data lands in a private temp file first and is renamed into place,
    /// so concurrent writers of one index never interleave.
    pub async fn write_chunk(&self, upload_id: Uuid, index: u64, data: &[u8]) -> io::Result<()> {
        let dir = self.parts_dir(upload_id);
        tokio::fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!(".chunk_{index}.{}.tmp", Uuid::new_v4().simple()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        let written = async {
            file.write_all(data).await?;
            file.sync_data().await
        }
        .await;
        drop(file);

        match written {
            Ok(()) => tokio::fs::rename(&tmp, self.chunk_path(upload_id, index)).await,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    /// Concatenate chunks `0..total_chunks` in index order, hashing as we go.
    pub async fn assemble(
        &self,
        upload_id: Uuid,
        total_chunks: u64,
        file_uuid: Uuid,
    ) -> Result<Assembled, AssembleError> {
        let dir = self.final_dir(upload_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{file_uuid}.data"));

        let mut out = tokio::fs::File::create(&path).await?;
        let mut checksum = StreamingChecksum::new();
        for index in 0..total_chunks {
            let chunk = tokio::fs::read(self.chunk_path(upload_id, index))
                .await
                .map_err(|source| AssembleError::ChunkRead { index, source })?;
            checksum.update(&chunk);
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        out.sync_all().await?;

        Ok(Assembled {
            path,
            size: checksum.len(),
            checksum: checksum.finish(),
        })
    }

    pub async fn discard_final(&self, upload_id: Uuid) {
        remove_dir_logged(&self.final_dir(upload_id)).await;
    }

    /// Remove both working directories of an upload.
    pub async fn cleanup(&self, upload_id: Uuid) {
        remove_dir_logged(&self.parts_dir(upload_id)).await;
        remove_dir_logged(&self.final_dir(upload_id)).await;
    }
}

async fn remove_dir_logged(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = %dir.display(), "failed to remove staging dir: {}", e),
    }
}
