//! Pipeline error type.

use axum::http::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building the wire-level view of an outbound request.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("invalid method {0:?}")]
    Method(String),
    #[error("invalid url {url:?}: {reason}")]
    Url { url: String, reason: String },
    #[error("invalid header {name:?}")]
    Header { name: String },
}

/// Errors flowing through the proxy pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("cannot build outbound request: {0}")]
    Translation(#[from] TranslationError),

    #[error("backend responded with status {status}")]
    BackendStatus { status: u16 },

    #[error("backend request failed: {0}")]
    Backend(#[source] BoxError),

    #[error("invalid backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("not enough proxies for this endpoint")]
    NotEnoughProxies,

    #[error("too many proxies for this endpoint")]
    TooManyProxies,

    #[error("endpoint {0} has no backends")]
    NoBackends(String),
}

impl ProxyError {
    /// Status code the handler renders for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BackendStatus { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ProxyError::Backend(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
