use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// SHA-256 of `data`, standard base64 encoded.
pub fn sha256_base64(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}

/// Checksum of an encrypted metadata blob as the client computes it: over
/// the decoded ciphertext, not the base64 text.
pub fn metadata_checksum(encoded_meta: &str) -> Result<String, ChecksumError> {
    let raw = STANDARD.decode(encoded_meta)?;
    Ok(sha256_base64(&raw))
}

/// Incremental form of [`sha256_base64`] for data assembled piecewise.
#[derive(Default, Clone)]
pub struct StreamingChecksum {
    hasher: Sha256,
    len: u64,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finish(self) -> String {
        STANDARD.encode(self.hasher.finalize())
    }
}

/// Stream a file from disk through SHA-256.
pub async fn file_checksum(path: &Path) -> Result<String, ChecksumError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut checksum = StreamingChecksum::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        checksum.update(&buf[..n]);
    }
    Ok(checksum.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            sha256_base64(b"abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut streaming = StreamingChecksum::new();
        streaming.update(b"hello ");
        streaming.update(b"world");
        assert_eq!(streaming.len(), 11);
        assert_eq!(streaming.finish(), sha256_base64(b"hello world"));
    }

    #[test]
    fn test_metadata_checksum_hashes_decoded_bytes() {
        let encoded = STANDARD.encode(b"ciphertext");
        assert_eq!(
            metadata_checksum(&encoded).unwrap(),
            sha256_base64(b"ciphertext")
        );
        assert!(metadata_checksum("***").is_err());
    }

    #[tokio::test]
    async fn test_file_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        let data = vec![7u8; READ_BUFFER_SIZE * 2 + 13];
        tokio::fs::write(&path, &data).await.unwrap();
        assert_eq!(file_checksum(&path).await.unwrap(), sha256_base64(&data));
    }
}
