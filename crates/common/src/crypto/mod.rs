mod checksum;
pub mod pake;
pub mod signature;

pub use checksum::{file_checksum, metadata_checksum, sha256_base64, ChecksumError, StreamingChecksum};
