use std::sync::Arc;
use std::time::Duration;

use object_store::{StorageError, Storage};

use crate::database::{Database, DatabaseSetupError};
use crate::download::Downloads;
use crate::ephemeral::{DynEphemeralStore, MemoryStore};
use crate::exchange::CredentialExchange;
use crate::session::SessionStore;
use crate::upload::{Staging, Uploads};
use crate::ServiceConfig;

/// Limits the request-signing middleware enforces.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub max_drift: Duration,
    pub max_body_bytes: usize,
}

/// Shared handles for every request handler. Cheap to clone.
#[derive(Clone)]
pub struct State(Arc<Inner>);

struct Inner {
    database: Database,
    storage: Storage,
    ephemeral: DynEphemeralStore,
    sessions: SessionStore,
    exchange: CredentialExchange,
    uploads: Uploads,
    downloads: Downloads,
    auth: AuthConfig,
}

impl State {
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StateSetupError> {
        let database = Database::connect(config.sqlite_path.as_deref()).await?;
        let storage = Storage::new(config.object_store.clone()).await?;
        tokio::fs::create_dir_all(&config.work_dir).await?;

        let ephemeral: DynEphemeralStore = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(ephemeral.clone());
        let protocol = &config.protocol;

        let exchange = CredentialExchange::new(
            config.server_setup.clone(),
            config.server_id.clone(),
            database.clone(),
            ephemeral.clone(),
            sessions.clone(),
            protocol.exchange(),
        );
        let uploads = Uploads::new(
            ephemeral.clone(),
            storage.clone(),
            database.clone(),
            Staging::new(config.work_dir.clone()),
            protocol.upload(),
        );
        let downloads = Downloads::new(
            ephemeral.clone(),
            storage.clone(),
            database.clone(),
            protocol.download_ttl(),
        );

        tracing::info!(
            server_id = %config.server_id,
            work_dir = %config.work_dir.display(),
            "service state ready"
        );

        Ok(Self(Arc::new(Inner {
            database,
            storage,
            ephemeral,
            sessions,
            exchange,
            uploads,
            downloads,
            auth: AuthConfig {
                max_drift: protocol.max_drift(),
                max_body_bytes: protocol.max_request_body_bytes,
            },
        })))
    }

    pub fn database(&self) -> &Database {
        &self.0.database
    }

    pub fn storage(&self) -> &Storage {
        &self.0.storage
    }

    pub fn ephemeral(&self) -> &DynEphemeralStore {
        &self.0.ephemeral
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.0.sessions
    }

    pub fn exchange(&self) -> &CredentialExchange {
        &self.0.exchange
    }

    pub fn uploads(&self) -> &Uploads {
        &self.0.uploads
    }

    pub fn downloads(&self) -> &Downloads {
        &self.0.downloads
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.0.auth
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to set up the catalog: {0}")]
    Database(#[from] DatabaseSetupError),
    #[error("failed to set up object storage: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to prepare the work directory: {0}")]
    Io(#[from] std::io::Error),
}
