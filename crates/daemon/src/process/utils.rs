use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Time in-flight requests get to finish after SIGTERM.
const REQUEST_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Spawn a task that turns SIGINT (immediately) or SIGTERM (after a grace
/// period) into a shutdown broadcast.
///
/// Returns the task, a sender for programmatic shutdown and a receiver
/// for tasks to wait on.
pub fn graceful_shutdown_blocker() -> (JoinHandle<()>, watch::Sender<()>, watch::Receiver<()>) {
    let (tx, rx) = watch::channel(());
    let signal_tx = tx.clone();
    let mut requested = rx.clone();

    let handle = tokio::spawn(async move {
        let signals = signal(SignalKind::interrupt())
            .and_then(|sigint| Ok((sigint, signal(SignalKind::terminate())?)));
        let (mut sigint, mut sigterm) = match signals {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!("failed to install signal handlers: {}", e);
                let _ = requested.changed().await;
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!(
                    grace_secs = REQUEST_GRACE_PERIOD.as_secs(),
                    "SIGTERM received, shutting down after grace period"
                );
                tokio::time::sleep(REQUEST_GRACE_PERIOD).await;
            }
            _ = requested.changed() => {
                tracing::info!("shutdown requested");
                return;
            }
        }

        let _ = signal_tx.send(());
    });

    (handle, tx, rx)
}

/// Route panics through `tracing` so they land in the same sinks as
/// everything else.
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| {
        let location = panic.location();
        tracing::error!(
            message = %panic,
            panic.file = location.map(|l| l.file()),
            panic.line = location.map(|l| l.line()),
        );
    }));
}

pub fn report_build_info() {
    let build = common::prelude::build_info();

    tracing::info!(
        version = build.version,
        profile = build.build_profile,
        features = build.build_features,
        built_at = build.build_timestamp,
        rustc = build.rust_version,
        "xfer daemon starting"
    );
}
