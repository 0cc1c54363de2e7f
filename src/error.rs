use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::ProxyScheme;

/// Unified error type for proxylens
#[derive(Error, Debug)]
pub enum LensError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Proxy errors
    #[error("Proxy unreachable: {0}")]
    ProxyUnreachable(String),

    #[error("Proxy protocol error: {0}")]
    ProxyProtocol(String),

    #[error("Proxy scheme {0} cannot be dialed from this environment")]
    ProxyUnsupported(ProxyScheme),

    // Fetch errors
    #[error("Request timeout - the proxy may be slow or unresponsive")]
    Timeout,

    #[error("Upstream returned HTTP status {status}")]
    UpstreamHttp { status: u16 },

    #[error("Too many redirects (gave up after {hops} hops)")]
    TooManyRedirects { hops: usize },

    #[error("Upstream transfer failed: {0}")]
    Upstream(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for proxylens operations
pub type Result<T> = std::result::Result<T, LensError>;

impl LensError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            LensError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            LensError::ProxyUnreachable(_)
            | LensError::ProxyProtocol(_)
            | LensError::ProxyUnsupported(_)
            | LensError::UpstreamHttp { .. }
            | LensError::TooManyRedirects { .. }
            | LensError::Upstream(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            LensError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            LensError::InvalidConfig(_) | LensError::Io(_) | LensError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            LensError::InvalidInput(_) => "invalid_input",
            LensError::ProxyUnreachable(_) => "proxy_unreachable",
            LensError::ProxyProtocol(_) => "proxy_protocol_error",
            LensError::ProxyUnsupported(_) => "proxy_unsupported",
            LensError::Timeout => "timeout",
            LensError::UpstreamHttp { .. } => "upstream_http_error",
            LensError::TooManyRedirects { .. } => "too_many_redirects",
            LensError::Upstream(_) => "upstream_error",
            LensError::InvalidConfig(_) => "invalid_config",
            LensError::Io(_) => "io_error",
            LensError::Internal(_) => "internal_error",
        }
    }

    /// Whether picking a different proxy is a sensible next step
    pub fn is_proxy_failure(&self) -> bool {
        matches!(
            self,
            LensError::ProxyUnreachable(_)
                | LensError::ProxyProtocol(_)
                | LensError::ProxyUnsupported(_)
                | LensError::Timeout
        )
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for LensError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        if let LensError::UpstreamHttp { status: upstream } = &self {
            body["upstream_status"] = json!(upstream);
        }

        (status, Json(body)).into_response()
    }
}
