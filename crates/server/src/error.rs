//! Errors returned to the page by the proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use swcache_core::Error;

/// Structured errors for the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The incoming request could not be turned into an intercepted one.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Neither the network nor the cache could answer.
    #[error(transparent)]
    Cache(#[from] Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ProxyError::Cache(Error::FetchTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Cache(e) if e.is_network() => StatusCode::BAD_GATEWAY,
            ProxyError::Cache(Error::InvalidUrl(_) | Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        (status, self.to_string()).into_response()
    }
}
