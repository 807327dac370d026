//! Short-lived coordination state shared by every request: protocol
//! challenges, sessions, upload plans and part sets, download stages.
//!
//! Everything here carries a time-to-live. Entries that outlive it are
//! invisible to readers and reclaimed by [`run_sweeper`].

mod memory;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

pub use memory::MemoryStore;

pub const REGISTRATION_CHALLENGE_PREFIX: &str = "reg-challenge:";
pub const LOGIN_CHALLENGE_PREFIX: &str = "login-challenge:";
pub const SESSION_PREFIX: &str = "session:";
pub const UPLOAD_PLAN_PREFIX: &str = "upload-plan:";
pub const UPLOAD_PARTS_PREFIX: &str = "upload-parts:";
pub const UPLOAD_CLAIM_PREFIX: &str = "upload-claim:";
pub const DOWNLOAD_PREFIX: &str = "download:";

#[derive(Debug, thiserror::Error)]
pub enum EphemeralError {
    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),
    #[error("value could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("ephemeral store unavailable: {0}")]
    Unavailable(String),
}

/// A key-value store with per-key expiry and atomic single-key operations.
#[async_trait::async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), EphemeralError>;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, EphemeralError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EphemeralError>;

    /// Atomically read and remove.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, EphemeralError>;

    async fn delete(&self, key: &str) -> Result<bool, EphemeralError>;

    async fn exists(&self, key: &str) -> Result<bool, EphemeralError>;

    /// Replace the value at `key` with `new` iff it currently equals `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, EphemeralError>;

    /// Reset the expiry of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, EphemeralError>;

    /// Add `member` to the set at `key`, creating it if needed. Returns
    /// whether the member was new.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration)
        -> Result<bool, EphemeralError>;

    /// A consistent snapshot of the set at `key`.
    async fn set_members(&self, key: &str) -> Result<Option<HashSet<String>>, EphemeralError>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, EphemeralError>;
}

pub type DynEphemeralStore = Arc<dyn EphemeralStore>;

pub async fn set_json<T: Serialize + Sync>(
    store: &dyn EphemeralStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), EphemeralError> {
    store.set(key, serde_json::to_vec(value)?, ttl).await
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn EphemeralStore,
    key: &str,
) -> Result<Option<T>, EphemeralError> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub async fn take_json<T: DeserializeOwned>(
    store: &dyn EphemeralStore,
    key: &str,
) -> Result<Option<T>, EphemeralError> {
    match store.take(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Periodically purge expired entries until shutdown is signalled.
pub async fn run_sweeper(
    store: DynEphemeralStore,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "swept expired ephemeral entries"),
                    Err(e) => tracing::warn!("ephemeral sweep failed: {}", e),
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("ephemeral sweeper shutting down");
                break;
            }
        }
    }
}
