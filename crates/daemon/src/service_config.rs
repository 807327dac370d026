use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::prelude::{PlannerConfig, ServerSetup};
use object_store::ObjectStoreConfig;

use crate::exchange::ExchangeConfig;
use crate::upload::UploadConfig;

/// Everything the running service needs, resolved from the config
/// directory and command line.
pub struct Config {
    /// address for the API server to listen on
    pub listen_addr: SocketAddr,
    /// identity the server presents during the key exchange
    pub server_id: String,
    /// long-lived OPAQUE key material
    pub server_setup: Arc<ServerSetup>,

    // storage configuration
    /// durable tier for uploaded files
    pub object_store: ObjectStoreConfig,
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    /// scratch space for chunks and reassembly
    pub work_dir: PathBuf,

    pub protocol: ProtocolConfig,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("server_id", &self.server_id)
            .field("object_store", &self.object_store)
            .field("sqlite_path", &self.sqlite_path)
            .field("work_dir", &self.work_dir)
            .field("protocol", &self.protocol)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .finish_non_exhaustive()
    }
}

/// Tunables of the transfer protocol, as written in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest accepted difference between client and server clocks.
    pub max_drift_secs: u64,
    pub registration_ttl_secs: u64,
    pub login_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub upload_ttl_secs: u64,
    pub download_ttl_secs: u64,
    /// How often expired ephemeral state is reclaimed.
    pub sweep_interval_secs: u64,
    /// Upper bound on a buffered private request body (chunk uploads).
    pub max_request_body_bytes: usize,
    pub planner: PlannerConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_drift_secs: 15,
            registration_ttl_secs: 300,
            login_ttl_secs: 300,
            session_ttl_secs: 1800,
            upload_ttl_secs: 24 * 60 * 60,
            download_ttl_secs: 60 * 60,
            sweep_interval_secs: 60,
            max_request_body_bytes: 32 * 1024 * 1024,
            planner: PlannerConfig::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn exchange(&self) -> ExchangeConfig {
        ExchangeConfig {
            registration_ttl: Duration::from_secs(self.registration_ttl_secs),
            login_ttl: Duration::from_secs(self.login_ttl_secs),
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        }
    }

    pub fn upload(&self) -> UploadConfig {
        UploadConfig {
            planner: self.planner.clone(),
            ttl: Duration::from_secs(self.upload_ttl_secs),
        }
    }

    pub fn download_ttl(&self) -> Duration {
        Duration::from_secs(self.download_ttl_secs)
    }

    pub fn max_drift(&self) -> Duration {
        Duration::from_secs(self.max_drift_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
