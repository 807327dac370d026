use clap::Args;

use xfer_daemon::http_server::api::v1::public::ConfigRequest;
use xfer_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

/// Reports problems in its output rather than failing.
#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:        {}", state.xfer_dir.display()));
                lines.push("  config.toml:      OK".to_string());
                lines.push("  db.sqlite:        OK".to_string());
                match state.load_server_setup() {
                    Ok(_) => lines.push("  server_setup.key: OK".to_string()),
                    Err(e) => lines.push(format!("  server_setup.key: {}", e)),
                }
                lines.push(format!("  api_port:         {}", state.config.api_port));
                lines.push(format!("  server_id:        {}", state.config.server_id));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        // 2. Check daemon probes
        lines.push(String::new());
        lines.push(format!("Daemon ({}):", ctx.client.base_url()));

        for (label, path) in [("livez", "/_status/livez"), ("readyz", "/_status/readyz")] {
            let status = match ctx.client.probe(path).await {
                Ok(status) if status.is_success() => "OK".to_string(),
                Ok(status) => format!("UNHEALTHY ({})", status),
                Err(_) => "NOT REACHABLE".to_string(),
            };
            lines.push(format!("  {}: {}", label, status));
        }

        // 3. Check the key exchange configuration
        match ctx.client.call(ConfigRequest).await {
            Ok(config) => {
                lines.push(format!("  server_id: {}", config.server_id));
                lines.push(format!("  pake:      {}", config.config));
            }
            Err(e) => lines.push(format!("  pake:      unavailable ({})", e)),
        }

        Ok(lines.join("\n"))
    }
}
