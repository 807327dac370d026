use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::http_server::api::error::error_response;

/// Fallback for unrouted paths. API clients asking for JSON get the usual
/// error body; anything else gets plain text.
pub async fn not_found_handler(uri: Uri, headers: HeaderMap) -> Response {
    tracing::debug!(%uri, "no route");

    let wants_json = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));

    if wants_json {
        error_response(StatusCode::NOT_FOUND, "NotFound", "no such route")
    } else {
        (StatusCode::NOT_FOUND, "not found").into_response()
    }
}
