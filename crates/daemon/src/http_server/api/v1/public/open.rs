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
    #[serde(rename = "bucketKey")]
    pub bucket_key: String,
    /// Base64 OPAQUE credential request.
    pub ke1: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOneResponse {
    pub ke2: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "loginID")]
    pub login_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTwoRequest {
    pub ke3: String,
    #[serde(rename = "loginID")]
    pub login_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTwoResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    /// Session lifetime in seconds.
    #[serde(rename = "sessionTTL")]
    pub session_ttl: u64,
    pub cipher: String,
}

pub async fn step_one(
    State(state): State<ServiceState>,
    Json(req): Json<StepOneRequest>,
) -> Result<impl IntoResponse, ExchangeError> {
    let ke1 = decode_message("ke1", &req.ke1)?;
    let start = state.exchange().login_start(&req.bucket_key, &ke1).await?;

    Ok(Json(StepOneResponse {
        ke2: STANDARD.encode(&start.ke2),
        client_id: start.client_id,
        login_id: start.login_id,
    }))
}

pub async fn step_two(
    State(state): State<ServiceState>,
    Json(req): Json<StepTwoRequest>,
) -> Result<impl IntoResponse, ExchangeError> {
    let ke3 = decode_message("ke3", &req.ke3)?;
    let opened = state.exchange().login_finish(&req.login_id, &ke3).await?;

    Ok(Json(StepTwoResponse {
        session_id: opened.session_id,
        session_ttl: opened.session_ttl.as_secs(),
        cipher: opened.cipher,
    }))
}
