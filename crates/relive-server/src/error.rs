//! Error types for the HTTP server.

use std::net::AddrParseError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// File not found under the web root.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Template is not valid UTF-8.
    #[error("Template is not valid UTF-8: {0}")]
    InvalidTemplate(String),

    /// Invalid listen address.
    #[error("Invalid address: {0}")]
    Address(#[from] AddrParseError),

    /// Marker watch could not be started.
    #[error("Watch error: {0}")]
    Watch(#[from] relive_watch::WatchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound(path) => (
                StatusCode::NOT_FOUND,
                json!({"error": "File not found", "path": path}),
            ),
            Self::InvalidTemplate(path) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Template is not valid UTF-8", "path": path}),
            ),
            Self::Address(_) | Self::Watch(_) | Self::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": self.to_string()}),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        let response = ServerError::NotFound("missing.html".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_io_error_status() {
        let err = std::io::Error::other("disk on fire");
        let response = ServerError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
