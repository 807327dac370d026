use axum::body::Bytes;
use axum::extract::{Json, Query, State};
use axum::response::IntoResponse;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::http_server::auth::AuthenticatedBucket;
use crate::upload::{CompleteUpload, UploadError};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    /// Measured upload speed in Mbps.
    pub up_speed: f32,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(rename = "uploadID")]
    pub upload_id: String,
    #[serde(rename = "chunkSize")]
    pub chunk_size: u64,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u64,
    #[serde(rename = "parallelConns")]
    pub parallel_conns: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartQuery {
    pub upload_id: String,
    pub chunk_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    #[serde(rename = "uploadID")]
    pub upload_id: String,
    #[serde(rename = "encFileInfo")]
    pub enc_file_info: String,
    #[serde(rename = "encFileInfoNonce")]
    pub enc_file_info_nonce: String,
    pub metadata: String,
    #[serde(rename = "metaNonce")]
    pub meta_nonce: String,
    #[serde(rename = "dataChecksum")]
    pub data_checksum: String,
    #[serde(rename = "metaChecksum")]
    pub meta_checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    #[serde(rename = "fileUUID")]
    pub file_uuid: String,
}

pub async fn init(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Json(req): Json<InitRequest>,
) -> Result<impl IntoResponse, UploadError> {
    let plan = state
        .uploads()
        .init(&auth.bucket, req.up_speed, req.file_size)
        .await?;

    Ok(Json(InitResponse {
        upload_id: plan.upload_id.to_string(),
        chunk_size: plan.chunk_size,
        total_chunks: plan.total_chunks,
        parallel_conns: plan.parallel_conns,
    }))
}

pub async fn part(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Query(query): Query<PartQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, UploadError> {
    state
        .uploads()
        .accept_chunk(&auth.bucket, &query.upload_id, query.chunk_id, body)
        .await?;
    Ok(http::StatusCode::NO_CONTENT)
}

pub async fn complete(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Json(req): Json<CompleteRequest>,
) -> Result<impl IntoResponse, UploadError> {
    let file_uuid = state
        .uploads()
        .complete(
            &auth.bucket,
            CompleteUpload {
                upload_id: req.upload_id,
                enc_file_info: req.enc_file_info,
                enc_file_info_nonce: req.enc_file_info_nonce,
                metadata: req.metadata,
                meta_nonce: req.meta_nonce,
                data_checksum: req.data_checksum,
                meta_checksum: req.meta_checksum,
            },
        )
        .await?;

    Ok((
        http::StatusCode::CREATED,
        Json(CompleteResponse {
            file_uuid: file_uuid.to_string(),
        }),
    ))
}
