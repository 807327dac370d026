use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::crypto::pake::SUITE_NAME;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

/// Ask the server which PAKE configuration to use before opening a bucket.
#[derive(Debug, Clone, Default)]
pub struct ConfigRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(rename = "serverID")]
    pub server_id: String,
    pub config: String,
}

pub async fn handler(State(state): State<ServiceState>) -> impl IntoResponse {
    Json(ConfigResponse {
        server_id: state.exchange().server_id().to_string(),
        config: SUITE_NAME.to_string(),
    })
}

impl ApiRequest for ConfigRequest {
    type Response = ConfigResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v1/public/bucket/open/config")?;
        Ok(client.get(full_url))
    }
}
