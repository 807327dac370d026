use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::crypto::pake::{decode_server_setup, encode_server_setup, generate_server_setup};
use common::prelude::ServerSetup;
use object_store::ObjectStoreConfig;

use crate::service_config::ProtocolConfig;

pub const APP_NAME: &str = "xfer";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const SETUP_FILE_NAME: &str = "server_setup.key";
pub const OBJECTS_DIR_NAME: &str = "objects";
pub const WORK_DIR_NAME: &str = "work";

pub const DEFAULT_API_PORT: u16 = 5050;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Identity presented to clients during the key exchange
    pub server_id: String,
    /// Durable storage for uploaded files. Defaults to `objects/` inside
    /// the config directory.
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            server_id: format!("{}-{}", APP_NAME, Uuid::new_v4().simple()),
            object_store: None,
            protocol: ProtocolConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the xfer directory (~/.xfer)
    pub xfer_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the base64 OPAQUE server setup
    pub setup_path: PathBuf,
    /// Path to the local object directory
    pub objects_path: PathBuf,
    /// Scratch space for upload chunks
    pub work_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the xfer directory path (custom or default ~/.xfer)
    pub fn xfer_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new xfer state directory with fresh server key material
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let xfer_dir = Self::xfer_dir(custom_path)?;

        if xfer_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&xfer_dir)?;

        let objects_path = xfer_dir.join(OBJECTS_DIR_NAME);
        fs::create_dir_all(&objects_path)?;
        let work_path = xfer_dir.join(WORK_DIR_NAME);
        fs::create_dir_all(&work_path)?;

        let setup = generate_server_setup();
        let setup_path = xfer_dir.join(SETUP_FILE_NAME);
        fs::write(&setup_path, encode_server_setup(&setup))?;

        let config = config.unwrap_or_default();
        let config_path = xfer_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        // the service runs migrations on first start
        let db_path = xfer_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            xfer_dir,
            db_path,
            setup_path,
            objects_path,
            work_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the xfer directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let xfer_dir = Self::xfer_dir(custom_path)?;

        if !xfer_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = xfer_dir.join(DB_FILE_NAME);
        let setup_path = xfer_dir.join(SETUP_FILE_NAME);
        let objects_path = xfer_dir.join(OBJECTS_DIR_NAME);
        let work_path = xfer_dir.join(WORK_DIR_NAME);
        let config_path = xfer_dir.join(CONFIG_FILE_NAME);

        for (path, name) in [
            (&db_path, DB_FILE_NAME),
            (&setup_path, SETUP_FILE_NAME),
            (&config_path, CONFIG_FILE_NAME),
        ] {
            if !path.exists() {
                return Err(StateError::MissingFile(name.to_string()));
            }
        }
        fs::create_dir_all(&work_path)?;

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self {
            xfer_dir,
            db_path,
            setup_path,
            objects_path,
            work_path,
            config_path,
            config,
        })
    }

    /// Load the OPAQUE server setup from its key file
    pub fn load_server_setup(&self) -> Result<ServerSetup, StateError> {
        let encoded = fs::read_to_string(&self.setup_path)?;
        decode_server_setup(encoded.trim()).map_err(|e| StateError::InvalidSetup(e.to_string()))
    }

    /// The configured object store, or the local objects directory.
    pub fn object_store(&self) -> ObjectStoreConfig {
        self.config
            .object_store
            .clone()
            .unwrap_or_else(|| ObjectStoreConfig::Local {
                path: self.objects_path.clone(),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("xfer directory not initialized. Run 'xfer init' first")]
    NotInitialized,

    #[error("xfer directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid server setup: {0}")]
    InvalidSetup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
