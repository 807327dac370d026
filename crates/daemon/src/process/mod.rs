//! Process lifecycle for the daemon binary: logging, background tasks and
//! shutdown.

mod logging;
pub mod utils;

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::ephemeral;
use crate::http_server;
use crate::{ServiceConfig, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const EXIT_STATE_FAILURE: i32 = 3;
const EXIT_SHUTDOWN_TIMEOUT: i32 = 4;

/// Handle for gracefully shutting down the daemon service.
pub struct ShutdownHandle {
    graceful_waiter: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Block until the service shuts down, either on a signal or after
    /// [`ShutdownHandle::shutdown`].
    pub async fn wait(self) {
        let _ = self.graceful_waiter.await;

        if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(self.tasks))
            .await
            .is_err()
        {
            tracing::error!(
                "Failed to shut down within {} seconds",
                FINAL_SHUTDOWN_TIMEOUT.as_secs()
            );
            std::process::exit(EXIT_SHUTDOWN_TIMEOUT);
        }
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn spawn_task<F>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        task.await;
        tracing::debug!(task = name, "background task stopped");
    })
}

/// Create state and spawn the API server and the ephemeral sweeper.
///
/// The returned `ShutdownHandle` must be kept alive; dropping it does not
/// stop the service.
pub async fn start_service(service_config: &ServiceConfig) -> (ServiceState, ShutdownHandle) {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker();

    let state = match ServiceState::from_config(service_config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(EXIT_STATE_FAILURE);
        }
    };

    let sweeper = spawn_task(
        "sweeper",
        ephemeral::run_sweeper(
            state.ephemeral().clone(),
            service_config.protocol.sweep_interval(),
            shutdown_rx.clone(),
        ),
    );

    let api_state = state.clone();
    let api_config = http_server::Config::new(service_config.listen_addr);
    let api_rx = shutdown_rx.clone();
    let api = spawn_task("api", async move {
        if let Err(e) = http_server::run_api(api_config, api_state, api_rx).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(
        addr = %service_config.listen_addr,
        server_id = %service_config.server_id,
        "xfer daemon running"
    );

    let handle = ShutdownHandle {
        graceful_waiter,
        tasks: vec![sweeper, api],
        shutdown_tx,
    };
    (state, handle)
}

/// Run the daemon until a shutdown signal arrives. Use for CLI binary usage.
pub async fn spawn_service(service_config: &ServiceConfig) {
    let _guards = logging::init(service_config.log_level, service_config.log_dir.as_deref());
    utils::register_panic_logger();
    utils::report_build_info();

    let (_, handle) = start_service(service_config).await;
    handle.wait().await;
}
