//! Durable storage for uploaded files.
//!
//! Each stored file is three objects under a common prefix: the encrypted
//! payload, the encrypted metadata blob and a digest blob carrying both
//! checksums. Backends are pluggable (S3/MinIO, local filesystem, memory)
//! through [`object_store`].
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use xfer_object_store::{ObjectStoreConfig, Storage};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), xfer_object_store::StorageError> {
//! let storage = Storage::new(ObjectStoreConfig::Local { path: "/tmp/xfer".into() }).await?;
//! let refs = storage
//!     .transfer(Path::new("/tmp/file.data"), Bytes::from("meta"), Bytes::from("digest"), "file-id")
//!     .await?;
//! println!("stored payload at {}", refs.data);
//! # Ok(())
//! # }
//! ```

mod error;
mod storage;

pub use error::{Result, StorageError};
pub use storage::{DataStream, ObjectStoreConfig, Storage, StorageRefs};
