use axum::Json;

use super::ProbeBody;

/// The process is up and serving requests; dependencies are not consulted.
pub async fn handler() -> Json<ProbeBody> {
    Json(ProbeBody::ok())
}
