use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;

use xfer_daemon::state::{AppState, StateError};
use xfer_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Log verbosity (overridden by RUST_LOG)
    #[arg(long, default_value_t = tracing::Level::INFO)]
    pub log_level: tracing::Level,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let server_setup = state.load_server_setup()?;

        let api_port = self.api_port.unwrap_or(state.config.api_port);

        let config = ServiceConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], api_port)),
            server_id: state.config.server_id.clone(),
            server_setup: Arc::new(server_setup),
            object_store: state.object_store(),
            sqlite_path: Some(state.db_path.clone()),
            work_dir: state.work_path.clone(),
            protocol: state.config.protocol.clone(),
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
