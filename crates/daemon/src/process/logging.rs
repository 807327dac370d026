use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "xfer.log";

fn filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber: compact stdout, plus a daily rolling
/// file when `log_dir` is set. `RUST_LOG` overrides `level`.
///
/// The returned guards flush the writers on drop and must outlive the
/// service.
pub fn init(level: tracing::Level, log_dir: Option<&Path>) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();

    let (stdout_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(guard);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(filter(level));

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: cannot create log directory {:?}: {}", dir, e);
            return None;
        }
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
        guards.push(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(filter(level)),
        )
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guards
}
