use thiserror::Error;

/// Transport and API-level failures; all of them are fatal to the current sync
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status} {body} {reason}")]
    Status {
        status: u16,
        body: String,
        reason: String,
    },

    #[error("API returned error=true: {0}")]
    ErrorFlag(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
