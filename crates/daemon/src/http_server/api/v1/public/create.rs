use axum::extract::{Json, State};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::exchange::ExchangeError;
use crate::http_server::api::v1::decode_message;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOneRequest {
    /// Base64 OPAQUE registration request.
    #[serde(rename = "s1Req")]
    pub s1_req: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOneResponse {
    #[serde(rename = "s1Resp")]
    pub s1_resp: String,
    #[serde(rename = "reqID")]
    pub req_id: String,
    #[serde(rename = "serverID")]
    pub server_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTwoRequest {
    #[serde(rename = "bucName")]
    pub bucket_name: String,
    /// Base64 OPAQUE registration upload.
    #[serde(rename = "s2Req")]
    pub s2_req: String,
    #[serde(rename = "reqID")]
    pub req_id: String,
    pub cipher: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTwoResponse {
    #[serde(rename = "bucketKey")]
    pub bucket_key: String,
    pub name: String,
}

pub async fn step_one(
    State(state): State<ServiceState>,
    Json(req): Json<StepOneRequest>,
) -> Result<impl IntoResponse, ExchangeError> {
    let message = decode_message("s1Req", &req.s1_req)?;
    let start = state.exchange().registration_start(&message).await?;

    Ok(Json(StepOneResponse {
        s1_resp: STANDARD.encode(&start.response),
        req_id: start.request_id,
        server_id: start.server_id,
    }))
}

pub async fn step_two(
    State(state): State<ServiceState>,
    Json(req): Json<StepTwoRequest>,
) -> Result<impl IntoResponse, ExchangeError> {
    let record = decode_message("s2Req", &req.s2_req)?;
    let created = state
        .exchange()
        .registration_finish(&req.bucket_name, &record, &req.req_id, &req.cipher)
        .await?;

    Ok((
        http::StatusCode::CREATED,
        Json(StepTwoResponse {
            bucket_key: created.key.to_string(),
            name: created.name,
        }),
    ))
}
