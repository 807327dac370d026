use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::http_server::api::error::internal_error;
use crate::http_server::auth::AuthenticatedBucket;
use crate::session::SessionError;
use crate::ServiceState;

pub struct CloseError(SessionError);

impl IntoResponse for CloseError {
    fn into_response(self) -> Response {
        tracing::error!("failed to close session: {}", self.0);
        internal_error()
    }
}

/// End the calling session. Later requests signed with its key are refused.
pub async fn close(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
) -> Result<impl IntoResponse, CloseError> {
    state
        .sessions()
        .revoke(&auth.session_id)
        .await
        .map_err(CloseError)?;
    tracing::info!(bucket = %auth.bucket, "session closed");
    Ok(http::StatusCode::NO_CONTENT)
}
