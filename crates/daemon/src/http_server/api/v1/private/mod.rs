//! Routes that require a signed request. The signing middleware is layered
//! on by the parent router; every handler here can rely on an
//! [`AuthenticatedBucket`](crate::http_server::auth::AuthenticatedBucket)
//! extension.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::ServiceState;

pub mod bucket;
pub mod download;
pub mod files;
pub mod upload;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/file/upload/init", post(upload::init))
        .route("/file/upload/part", post(upload::part))
        .route("/file/upload/complete", post(upload::complete))
        .route("/file/list", get(files::list))
        .route("/file/delete", delete(files::delete))
        .route("/file/download/init", get(download::init))
        .route("/file/download/data", get(download::data))
        .route("/file/download/meta", get(download::meta))
        .route("/file/download/digest", get(download::digest))
        .route("/bucket/close", post(bucket::close))
        .with_state(state)
}
