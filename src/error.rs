//! Error handling module
//!
//! Defines the error types for the proxy with HTTP status code mapping

use http::StatusCode;
use thiserror::Error;

/// Main error type for the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid path expression '{expression}': {reason}")]
    InvalidPathExpression { expression: String, reason: String },

    // Routing errors
    #[error("No route found for path: {path}")]
    NoRouteFound { path: String },

    // Upstream errors
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    // Rewrite errors. Most rewrite failures degrade to a pass-through
    // instead of surfacing; this variant covers the ones that cannot.
    #[error("Rewrite error: {0}")]
    RewriteError(String),

    #[error("URI parse error: {uri}, reason: {reason}")]
    UriParse { uri: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Convert ProxyError to the appropriate HTTP status code
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            // Not found errors (404)
            ProxyError::NoRouteFound { .. } => StatusCode::NOT_FOUND,

            // Upstream errors (502)
            ProxyError::UpstreamError(_) => StatusCode::BAD_GATEWAY,

            // Internal server errors (500)
            ProxyError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidPathExpression { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::RewriteError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UriParse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ProxyError::ConfigError(message.into())
    }

    /// Create an upstream error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        ProxyError::UpstreamError(message.into())
    }

    /// Create an invalid path expression error
    pub fn invalid_path_expression<S: Into<String>>(expression: S, reason: S) -> Self {
        ProxyError::InvalidPathExpression {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Create a no route found error
    pub fn no_route_found<S: Into<String>>(path: S) -> Self {
        ProxyError::NoRouteFound { path: path.into() }
    }
}
