use axum::extract::{Json, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::database::CatalogError;
use crate::http_server::api::error::{error_response, internal_error};
use crate::http_server::auth::AuthenticatedBucket;
use crate::ServiceState;

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteQuery {
    pub file_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    #[error("file not found")]
    NotFound,
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("storage error: {0}")]
    Storage(#[from] object_store::StorageError),
}

impl IntoResponse for FilesError {
    fn into_response(self) -> Response {
        match self {
            FilesError::NotFound => {
                error_response(http::StatusCode::NOT_FOUND, "NotFound", "file not found")
            }
            e => {
                tracing::error!("file operation failed: {}", e);
                internal_error()
            }
        }
    }
}

pub async fn list(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
) -> Result<impl IntoResponse, FilesError> {
    let bucket_id = state
        .database()
        .get_bucket_id(&auth.bucket)
        .await?
        .ok_or(FilesError::NotFound)?;
    let files = state.database().get_files(bucket_id).await?;
    Ok(Json(files))
}

/// Remove the stored objects first; the catalog entry is only invalidated
/// once storage no longer holds them.
pub async fn delete(
    State(state): State<ServiceState>,
    Extension(auth): Extension<AuthenticatedBucket>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, FilesError> {
    let file_uuid = Uuid::parse_str(&query.file_id).map_err(|_| FilesError::NotFound)?;
    let bucket_id = state
        .database()
        .get_bucket_id(&auth.bucket)
        .await?
        .ok_or(FilesError::NotFound)?;
    let record = state
        .database()
        .get_file_by_uuid(bucket_id, file_uuid)
        .await?
        .ok_or(FilesError::NotFound)?;

    state.storage().delete(&record.file_uuid.to_string()).await?;
    state.database().set_file_validity(record.id, false).await?;

    tracing::info!(bucket = %auth.bucket, file = %file_uuid, "file deleted");
    Ok(http::StatusCode::NO_CONTENT)
}
