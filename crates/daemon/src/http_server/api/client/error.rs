use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("bad endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    /// The server answered with a structured error body.
    #[error("{status} {code}: {message}")]
    Rejected {
        status: StatusCode,
        code: String,
        message: String,
    },
    /// The server answered with a non-success status and no error body.
    #[error("unexpected status {0}: {1}")]
    Status(StatusCode, String),
}
