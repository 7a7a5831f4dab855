use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request rejected with {0}, credentials are missing or expired")]
    Unauthorized(StatusCode),
    #[error("server answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no bearer token configured for an authenticated endpoint")]
    MissingToken,
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::MissingToken)
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("could not resolve address, please enter it manually")]
    Unresolved,
    #[error("could not resolve address, please enter it manually")]
    Service(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session expired, please log in again")]
    Expired,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
