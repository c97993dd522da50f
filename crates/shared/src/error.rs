use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Non-2xx response other than 401/5xx, or the request never completed.
    Transport,
    Unauthorized,
    Server,
    /// A call that must return a body returned none.
    EmptyResult,
    /// Client-side rule violation, e.g. no opened album.
    Domain,
}

/// Failure detail carried by failure signals and kept in slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Domain, message)
    }
}
