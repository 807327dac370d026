//! Sessions issued after a successful bucket login.
//!
//! A session binds an id to the bucket it opened and to the key agreed
//! during the handshake. Expiry is absolute: a session is valid while
//! `now < expires_at` and is never extended.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::prelude::BucketKey;

use crate::ephemeral::{self, DynEphemeralStore, EphemeralError, SESSION_PREFIX};

#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner: BucketKey,
    #[serde(with = "key_encoding")]
    key: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Session {
    /// The shared secret used to verify request signatures.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("key", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

mod key_encoding {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session expired")]
    Expired,
    #[error("session ttl must be positive")]
    InvalidTtl,
    #[error("ephemeral store error: {0}")]
    Store(#[from] EphemeralError),
}

#[derive(Clone)]
pub struct SessionStore {
    store: DynEphemeralStore,
}

impl SessionStore {
    pub fn new(store: DynEphemeralStore) -> Self {
        Self { store }
    }

    fn record_key(id: &str) -> String {
        format!("{SESSION_PREFIX}{id}")
    }

    /// Write a new session in a single put. Nothing is stored on failure.
    pub async fn create(
        &self,
        id: &str,
        owner: BucketKey,
        key: Vec<u8>,
        ttl: Duration,
    ) -> Result<Session, SessionError> {
        if ttl.is_zero() {
            return Err(SessionError::InvalidTtl);
        }
        let created_at = OffsetDateTime::now_utc();
        let session = Session {
            id: id.to_string(),
            owner,
            key,
            created_at,
            expires_at: created_at + ttl,
        };

        ephemeral::set_json(self.store.as_ref(), &Self::record_key(id), &session, ttl).await?;
        tracing::debug!(session_id = id, owner = %session.owner, "session created");
        Ok(session)
    }

    pub async fn validate(&self, id: &str) -> Result<Session, SessionError> {
        self.validate_at(id, OffsetDateTime::now_utc()).await
    }

    /// Validate against an explicit clock reading. Expired sessions are
    /// removed as a side effect.
    pub async fn validate_at(
        &self,
        id: &str,
        now: OffsetDateTime,
    ) -> Result<Session, SessionError> {
        let key = Self::record_key(id);
        let session: Session = ephemeral::get_json(self.store.as_ref(), &key)
            .await?
            .ok_or(SessionError::NotFound)?;

        if !session.is_valid_at(now) {
            self.store.delete(&key).await?;
            tracing::debug!(session_id = id, "session expired");
            return Err(SessionError::Expired);
        }

        Ok(session)
    }

    pub async fn revoke(&self, id: &str) -> Result<(), SessionError> {
        self.store.delete(&Self::record_key(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ephemeral::MemoryStore;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    fn owner() -> BucketKey {
        "ABC-XYZ-12".parse().unwrap()
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let sessions = store();
        let session = sessions
            .create("s1", owner(), vec![7; 64], Duration::from_secs(1800))
            .await
            .unwrap();
        assert_eq!(
            session.expires_at - session.created_at,
            time::Duration::seconds(1800)
        );

        let before = session.expires_at - time::Duration::seconds(1);
        let validated = sessions.validate_at("s1", before).await.unwrap();
        assert_eq!(validated.key(), session.key());
        assert_eq!(validated.owner, owner());

        let after = session.expires_at + time::Duration::seconds(1);
        assert!(matches!(
            sessions.validate_at("s1", after).await,
            Err(SessionError::Expired)
        ));
        assert!(matches!(
            sessions.validate_at("s1", before).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expires_exactly_at_deadline() {
        let sessions = store();
        let session = sessions
            .create("s2", owner(), vec![1], Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(
            sessions.validate_at("s2", session.expires_at).await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let sessions = store();
        sessions
            .create("s3", owner(), vec![1], Duration::from_secs(60))
            .await
            .unwrap();
        sessions.revoke("s3").await.unwrap();
        sessions.revoke("s3").await.unwrap();
        assert!(matches!(
            sessions.validate("s3").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let sessions = store();
        assert!(matches!(
            sessions.create("s4", owner(), vec![1], Duration::ZERO).await,
            Err(SessionError::InvalidTtl)
        ));
        assert!(matches!(
            sessions.validate("s4").await,
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: "s".into(),
            owner: owner(),
            key: b"supersecret".to_vec(),
            created_at: now,
            expires_at: now + time::Duration::seconds(1),
        };
        assert!(!format!("{session:?}").contains("supersecret"));
    }
}
