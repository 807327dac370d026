// Service modules (daemon functionality)
pub mod database;
pub mod download;
pub mod ephemeral;
pub mod exchange;
pub mod http_server;
pub mod process;
pub mod service_config;
pub mod service_state;
pub mod session;
pub mod upload;

// App state (configuration, paths)
pub mod state;

// Re-exports for the CLI and integration tests
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use service_config::Config as ServiceConfig;
pub use service_state::State as ServiceState;
pub use state::{AppConfig, AppState, StateError};
