use axum::body::Body;
use axum::extract::{Json, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::download::DownloadError;
use crate::http_server::api::DOWNLOAD_ID_HEADER;
use crate::http_server::auth::AuthenticatedBucket;
use crate::ServiceState;

#[derive(Debug, Clone, Deserialize)]
pub struct FileQuery {
    pub file_id: String,
}

impl FileQuery {
    fn file_uuid(&self) -> Result<Uuid, DownloadError> {
        Uuid::parse_str(&self.file_id).map_err(|_| DownloadError::NotFound)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(rename = "downloadID")]
    pub download_id: String,
}

fn download_id(headers: &HeaderMap) -> Result<&str, DownloadError> {
    headers
        .get(DOWNLOAD_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(DownloadError::NotFound)
}

pub async fn init(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Query(query): Query<FileQuery>,
) -> Result<Response, DownloadError> {
    let download_id = state
        .downloads()
        .init(&auth.bucket, query.file_uuid()?)
        .await?;

    let header_value =
        HeaderValue::from_str(&download_id).map_err(|e| DownloadError::Storage(e.to_string()))?;
    let mut response = Json(InitResponse { download_id }).into_response();
    response
        .headers_mut()
        .insert(DOWNLOAD_ID_HEADER, header_value);
    Ok(response)
}

pub async fn data(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
) -> Result<Response, DownloadError> {
    let download = state
        .downloads()
        .data(&auth.bucket, download_id(&headers)?, query.file_uuid()?)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, download.size.to_string()),
        ],
        Body::from_stream(download.stream),
    )
        .into_response())
}

pub async fn meta(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, DownloadError> {
    let meta = state
        .downloads()
        .meta(&auth.bucket, download_id(&headers)?, query.file_uuid()?)
        .await?;
    Ok(Json(meta))
}

pub async fn digest(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, DownloadError> {
    let digest = state
        .downloads()
        .digest(&auth.bucket, download_id(&headers)?, query.file_uuid()?)
        .await?;
    Ok(Json(digest))
}
