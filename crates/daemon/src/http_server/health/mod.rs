//! Probes for orchestrators and the `health` command.

use axum::routing::get;
use axum::Router;
use serde::Serialize;

mod liveness;
mod readiness;
mod version;

use crate::ServiceState;

/// Body shared by the liveness and readiness probes.
#[derive(Debug, Serialize)]
pub struct ProbeBody {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProbeBody {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: "failure",
            message: Some(message.into()),
        }
    }
}

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .route("/version", get(version::handler))
        .with_state(state)
}
