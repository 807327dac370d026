use axum::Router;
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use http::{HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

use common::crypto::signature::{
    BODY_SIGNATURE_HEADER, REQUEST_SIGNATURE_HEADER, SESSION_ID_HEADER, TIMESTAMP_HEADER,
};

pub mod client;
pub mod error;
pub mod v1;

use crate::ServiceState;

/// Response header carrying the id of an in-flight download.
pub const DOWNLOAD_ID_HEADER: &str = "x-download-id";

pub fn router(state: ServiceState) -> Router<ServiceState> {
    let cors_layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE])
        .allow_headers(vec![
            ACCEPT,
            CONTENT_TYPE,
            ORIGIN,
            HeaderName::from_static(TIMESTAMP_HEADER),
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderName::from_static(REQUEST_SIGNATURE_HEADER),
            HeaderName::from_static(BODY_SIGNATURE_HEADER),
            HeaderName::from_static(DOWNLOAD_ID_HEADER),
        ])
        .expose_headers(vec![HeaderName::from_static(DOWNLOAD_ID_HEADER)])
        .allow_origin(Any)
        .allow_credentials(false);

    Router::new()
        .nest("/v1", v1::router(state.clone()))
        .with_state(state)
        .layer(cors_layer)
}
