//! Failures of the durable storage tier.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store backend: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Reading a staged payload from local disk failed.
    #[error("local io: {0}")]
    Io(#[from] std::io::Error),

    #[error("no stored object for file {0}")]
    NotFound(String),

    #[error("storage misconfigured: {0}")]
    InvalidConfig(String),

    /// The configured S3 bucket is absent; it is never created implicitly.
    #[error("S3 bucket '{0}' does not exist")]
    BucketNotFound(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
