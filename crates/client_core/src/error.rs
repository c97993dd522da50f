use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("something went wrong on the server ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("request failed ({status}): {reason}")]
    Transport { status: u16, reason: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("result is empty for {path}")]
    EmptyResult { path: String },
    #[error("invalid response body for {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Domain(String),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::Server { .. } => ErrorCode::Server,
            Self::Transport { .. } | Self::Http(_) | Self::Decode { .. } => ErrorCode::Transport,
            Self::EmptyResult { .. } => ErrorCode::EmptyResult,
            Self::Domain(_) | Self::Image(_) => ErrorCode::Domain,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<&ClientError> for ApiError {
    fn from(value: &ClientError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

impl From<ClientError> for ApiError {
    fn from(value: ClientError) -> Self {
        Self::from(&value)
    }
}
