//! Bucket creation and opening over OPAQUE.
//!
//! Both flows take two round trips. The state carried between the two
//! calls lives in the ephemeral store under a random id with a bounded
//! lifetime and is consumed atomically by the second call, so each
//! challenge can be used at most once.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opaque_ke::{
    CredentialFinalization, CredentialRequest, Identifiers, RegistrationRequest,
    RegistrationUpload, ServerLogin, ServerLoginStartParameters, ServerRegistration,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::prelude::{BucketKey, ServerSetup, XferSuite};

use crate::database::{CatalogError, Database};
use crate::ephemeral::{
    self, DynEphemeralStore, EphemeralError, LOGIN_CHALLENGE_PREFIX, REGISTRATION_CHALLENGE_PREFIX,
};
use crate::session::{SessionError, SessionStore};

const CREDENTIAL_ID_LEN: usize = 64;
/// Attempts at drawing an unused bucket key before giving up.
const BUCKET_KEY_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub registration_ttl: Duration,
    pub login_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            registration_ttl: Duration::from_secs(300),
            login_ttl: Duration::from_secs(300),
            session_ttl: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("malformed protocol message: {0}")]
    Protocol(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("bucket not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("ephemeral store error: {0}")]
    Store(#[from] EphemeralError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl From<CatalogError> for ExchangeError {
    fn from(err: CatalogError) -> Self {
        ExchangeError::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationStart {
    pub response: Vec<u8>,
    pub request_id: String,
    pub server_id: String,
}

#[derive(Debug, Clone)]
pub struct CreatedBucket {
    pub key: BucketKey,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct LoginStart {
    pub ke2: Vec<u8>,
    pub client_id: String,
    pub login_id: String,
}

#[derive(Debug, Clone)]
pub struct OpenedBucket {
    pub session_id: String,
    pub session_ttl: Duration,
    pub cipher: String,
}

/// What survives between login step one and step two.
#[derive(Serialize, Deserialize)]
struct LoginChallenge {
    /// Serialized `ServerLogin` state, base64.
    state: String,
    bucket_key: BucketKey,
}

pub struct CredentialExchange {
    setup: Arc<ServerSetup>,
    server_id: String,
    database: Database,
    store: DynEphemeralStore,
    sessions: SessionStore,
    config: ExchangeConfig,
}

impl CredentialExchange {
    pub fn new(
        setup: Arc<ServerSetup>,
        server_id: String,
        database: Database,
        store: DynEphemeralStore,
        sessions: SessionStore,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            setup,
            server_id,
            database,
            store,
            sessions,
            config,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Registration step one: answer the client's blinded request.
    pub async fn registration_start(
        &self,
        request: &[u8],
    ) -> Result<RegistrationStart, ExchangeError> {
        let request = RegistrationRequest::<XferSuite>::deserialize(request)
            .map_err(|e| ExchangeError::Protocol(e.to_string()))?;

        let mut credential_id = vec![0u8; CREDENTIAL_ID_LEN];
        OsRng.fill_bytes(&mut credential_id);

        let start = ServerRegistration::<XferSuite>::start(&self.setup, request, &credential_id)
            .map_err(|e| ExchangeError::Protocol(e.to_string()))?;

        let request_id = Uuid::new_v4().to_string();
        self.store
            .set(
                &format!("{REGISTRATION_CHALLENGE_PREFIX}{request_id}"),
                credential_id,
                self.config.registration_ttl,
            )
            .await?;

        tracing::debug!(request_id, "registration challenge issued");
        Ok(RegistrationStart {
            response: start.message.serialize().to_vec(),
            request_id,
            server_id: self.server_id.clone(),
        })
    }

    /// Registration step two: store the client's record as a new bucket.
    pub async fn registration_finish(
        &self,
        bucket_name: &str,
        record: &[u8],
        request_id: &str,
        cipher: &str,
    ) -> Result<CreatedBucket, ExchangeError> {
        if bucket_name.trim().is_empty() {
            return Err(ExchangeError::InvalidRequest(
                "bucket name must not be empty".into(),
            ));
        }

        let credential_id = self
            .store
            .take(&format!("{REGISTRATION_CHALLENGE_PREFIX}{request_id}"))
            .await?
            .ok_or_else(|| {
                ExchangeError::InvalidRequest("unknown or expired registration request".into())
            })?;

        let upload = RegistrationUpload::<XferSuite>::deserialize(record)
            .map_err(|e| ExchangeError::Protocol(e.to_string()))?;
        let password_file = ServerRegistration::<XferSuite>::finish(upload)
            .serialize()
            .to_vec();

        for attempt in 1..=BUCKET_KEY_ATTEMPTS {
            let key = BucketKey::generate();
            match self
                .database
                .insert_bucket(&key, bucket_name, &credential_id, &password_file, cipher)
                .await
            {
                Ok(_) => {
                    tracing::info!(bucket = %key, "bucket created");
                    return Ok(CreatedBucket {
                        key,
                        name: bucket_name.to_string(),
                    });
                }
                Err(CatalogError::DuplicateKey) => {
                    tracing::warn!(attempt, "bucket key collision, drawing another");
                }
                Err(e) => {
                    tracing::error!("failed to persist bucket: {}", e);
                    return Err(e.into());
                }
            }
        }

        Err(ExchangeError::Persistence(
            "could not allocate an unused bucket key".into(),
        ))
    }

    /// Login step one: process KE1 with a fresh server instance.
    pub async fn login_start(
        &self,
        bucket_key: &str,
        ke1: &[u8],
    ) -> Result<LoginStart, ExchangeError> {
        let key: BucketKey = bucket_key.parse().map_err(|_| ExchangeError::NotFound)?;
        let bucket = self
            .database
            .get_bucket(&key)
            .await?
            .ok_or(ExchangeError::NotFound)?;

        let request = CredentialRequest::<XferSuite>::deserialize(ke1)
            .map_err(|e| ExchangeError::Protocol(e.to_string()))?;
        let password_file = ServerRegistration::<XferSuite>::deserialize(&bucket.record)
            .map_err(|e| ExchangeError::Persistence(format!("stored record unreadable: {e}")))?;

        let start = ServerLogin::start(
            &mut OsRng,
            &self.setup,
            Some(password_file),
            request,
            &bucket.credential_id,
            ServerLoginStartParameters {
                context: None,
                identifiers: Identifiers {
                    client: Some(bucket.name.as_bytes()),
                    server: Some(self.server_id.as_bytes()),
                },
            },
        )
        .map_err(|e| ExchangeError::Protocol(e.to_string()))?;

        let login_id = Uuid::new_v4().to_string();
        let challenge = LoginChallenge {
            state: STANDARD.encode(start.state.serialize()),
            bucket_key: key,
        };
        ephemeral::set_json(
            self.store.as_ref(),
            &format!("{LOGIN_CHALLENGE_PREFIX}{login_id}"),
            &challenge,
            self.config.login_ttl,
        )
        .await?;

        tracing::debug!(login_id, "login challenge issued");
        Ok(LoginStart {
            ke2: start.message.serialize().to_vec(),
            client_id: bucket.name,
            login_id,
        })
    }

    /// Login step two: verify KE3 and open a session keyed by the login id.
    pub async fn login_finish(
        &self,
        login_id: &str,
        ke3: &[u8],
    ) -> Result<OpenedBucket, ExchangeError> {
        let challenge: LoginChallenge = ephemeral::take_json(
            self.store.as_ref(),
            &format!("{LOGIN_CHALLENGE_PREFIX}{login_id}"),
        )
        .await?
        .ok_or(ExchangeError::Unauthorized)?;

        let finalization = CredentialFinalization::<XferSuite>::deserialize(ke3)
            .map_err(|e| ExchangeError::Protocol(e.to_string()))?;
        let state = STANDARD
            .decode(&challenge.state)
            .ok()
            .and_then(|raw| ServerLogin::<XferSuite>::deserialize(&raw).ok())
            .ok_or_else(|| ExchangeError::Persistence("login state unreadable".into()))?;

        let finished = state.finish(finalization).map_err(|e| {
            tracing::debug!(login_id, "login rejected: {}", e);
            ExchangeError::Unauthorized
        })?;

        let bucket = self
            .database
            .get_bucket(&challenge.bucket_key)
            .await?
            .ok_or(ExchangeError::NotFound)?;

        let session = self
            .sessions
            .create(
                login_id,
                challenge.bucket_key,
                finished.session_key.to_vec(),
                self.config.session_ttl,
            )
            .await?;

        tracing::info!(bucket = %session.owner, "bucket opened");
        Ok(OpenedBucket {
            session_id: session.id,
            session_ttl: self.config.session_ttl,
            cipher: bucket.cipher,
        })
    }
}
