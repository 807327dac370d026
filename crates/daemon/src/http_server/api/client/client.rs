use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::api::error::ErrorBody;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin typed client for a remote daemon.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let response = request
            .build_request(&self.remote, &self.client)?
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<T::Response>().await?)
    }

    /// GET a path on the remote and report only the status.
    pub async fn probe(&self, path: &str) -> Result<StatusCode, ApiError> {
        let url = self.remote.join(path)?;
        Ok(self.client.get(url).send().await?.status())
    }

    pub fn base_url(&self) -> &Url {
        &self.remote
    }
}

async fn rejection(response: Response) -> ApiError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return ApiError::Transport(e),
    };
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => ApiError::Rejected {
            status,
            code: body.error,
            message: body.message,
        },
        Err(_) => ApiError::Status(status, text),
    }
}
