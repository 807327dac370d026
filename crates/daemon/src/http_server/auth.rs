//! Request signing gate for private routes.
//!
//! Checks run in a fixed order and the first failure ends the request:
//! timestamp format, clock drift, session, request-line signature, body
//! signature. A request that passes gets an [`AuthenticatedBucket`]
//! extension and is otherwise untouched; the body is buffered so the
//! handler can still read it.

use axum::body::Body;
use axum::extract::{OriginalUri, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;

use common::crypto::signature::{
    self, BODY_SIGNATURE_HEADER, REQUEST_SIGNATURE_HEADER, SESSION_ID_HEADER, TIMESTAMP_HEADER,
};
use common::prelude::BucketKey;

use crate::http_server::api::error::error_response;
use crate::session::SessionError;
use crate::ServiceState;

/// The bucket (and session) a private request was signed for.
#[derive(Debug, Clone)]
pub struct AuthenticatedBucket {
    pub bucket: BucketKey,
    pub session_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or unparsable timestamp")]
    BadTimestamp,
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("request body too large or unreadable")]
    Body,
    #[error("session lookup failed: {0}")]
    Session(SessionError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::BadTimestamp => {
                error_response(StatusCode::BAD_REQUEST, "BadRequest", "invalid timestamp")
            }
            AuthError::Unauthorized(reason) => {
                tracing::debug!(reason, "request rejected");
                error_response(StatusCode::UNAUTHORIZED, "Unauthorized", "unauthorized")
            }
            AuthError::Body => error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "BadRequest",
                "request body too large or unreadable",
            ),
            AuthError::Session(e) => {
                tracing::error!("session store failure during auth: {}", e);
                crate::http_server::api::error::internal_error()
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

pub async fn signed_request(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();

    // 1. timestamp
    let timestamp = header(&parts.headers, TIMESTAMP_HEADER)
        .ok_or(AuthError::BadTimestamp)?
        .to_string();
    let client_time: i64 = timestamp.parse().map_err(|_| AuthError::BadTimestamp)?;

    // 2. drift
    let drift = OffsetDateTime::now_utc()
        .unix_timestamp()
        .abs_diff(client_time);
    if drift > state.auth().max_drift.as_secs() {
        return Err(AuthError::Unauthorized("clock drift"));
    }

    // 3. session
    let session_id = header(&parts.headers, SESSION_ID_HEADER)
        .ok_or(AuthError::Unauthorized("missing session"))?
        .to_string();
    let session = match state.sessions().validate(&session_id).await {
        Ok(session) => session,
        Err(SessionError::NotFound) | Err(SessionError::Expired) => {
            return Err(AuthError::Unauthorized("invalid session"))
        }
        Err(e) => return Err(AuthError::Session(e)),
    };

    // 4. request line
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone());
    let canonical = signature::canonical_request(
        parts.method.as_str(),
        uri.path(),
        uri.query().unwrap_or(""),
        &timestamp,
    );
    let request_signature = header(&parts.headers, REQUEST_SIGNATURE_HEADER)
        .ok_or(AuthError::Unauthorized("missing request signature"))?;
    signature::verify(session.key(), canonical.as_bytes(), request_signature)
        .map_err(|_| AuthError::Unauthorized("request signature"))?;

    // 5. body
    let bytes = axum::body::to_bytes(body, state.auth().max_body_bytes)
        .await
        .map_err(|_| AuthError::Body)?;
    let body_signature = header(&parts.headers, BODY_SIGNATURE_HEADER)
        .ok_or(AuthError::Unauthorized("missing body signature"))?;
    signature::verify(session.key(), &bytes, body_signature)
        .map_err(|_| AuthError::Unauthorized("body signature"))?;

    // 6. hand over
    parts.extensions.insert(AuthenticatedBucket {
        bucket: session.owner,
        session_id,
    });
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
