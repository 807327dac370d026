use std::sync::Arc;

use axum::middleware;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::HeaderName;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;

use common::crypto::signature::{BODY_SIGNATURE_HEADER, REQUEST_SIGNATURE_HEADER};

pub mod private;
pub mod public;

use crate::exchange::ExchangeError;
use crate::http_server::auth;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    let sensitive: Arc<[HeaderName]> = Arc::new([
        HeaderName::from_static(REQUEST_SIGNATURE_HEADER),
        HeaderName::from_static(BODY_SIGNATURE_HEADER),
    ]);

    let private = private::router(state.clone())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::signed_request,
        ))
        .layer(SetSensitiveRequestHeadersLayer::from_shared(sensitive));

    Router::new()
        .nest("/public", public::router(state.clone()))
        .nest("/private", private)
        .with_state(state)
}

/// Decode a base64 protocol message from a JSON field.
pub(crate) fn decode_message(field: &str, value: &str) -> Result<Vec<u8>, ExchangeError> {
    STANDARD
        .decode(value)
        .map_err(|e| ExchangeError::Protocol(format!("{field} is not valid base64: {e}")))
}
