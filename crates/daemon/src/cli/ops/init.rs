use clap::Args;

use xfer_daemon::state::{AppConfig, AppState, StateError, DEFAULT_API_PORT};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Identity presented to clients during the key exchange
    /// (a random one is generated if not set)
    #[arg(long)]
    pub server_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            api_port: self.api_port,
            ..Default::default()
        };
        if let Some(server_id) = &self.server_id {
            config.server_id = server_id.clone();
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized xfer directory at: {}\n\
             - Database: {}\n\
             - Server setup: {}\n\
             - Objects: {}\n\
             - Config: {}\n\
             - Server id: {}\n\
             - API port: {}",
            state.xfer_dir.display(),
            state.db_path.display(),
            state.setup_path.display(),
            state.objects_path.display(),
            state.config_path.display(),
            state.config.server_id,
            state.config.api_port,
        );

        Ok(output)
    }
}
