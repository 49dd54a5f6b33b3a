use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures of a chat relay.
///
/// `Validation` is reported synchronously as an HTTP 400. Everything else
/// happens after the stream has started and is sent to the caller as an
/// error event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("No message provided")]
    Validation,

    #[error("Invalid API key. Please check your OpenRouter API key.")]
    Auth,

    #[error("Insufficient credits. Please add credits to your OpenRouter account.")]
    Quota,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimit,

    #[error("HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Request timeout. Please try again.")]
    Timeout,

    #[error("Connection error. Please check your internet connection.")]
    Connection,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl RelayError {
    /// Map a non-200 upstream status to its error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => RelayError::Auth,
            402 => RelayError::Quota,
            429 => RelayError::RateLimit,
            _ => RelayError::Upstream { status, body },
        }
    }

    /// Map a transport failure from reqwest.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else if err.is_connect() {
            RelayError::Connection
        } else {
            RelayError::Unexpected(err.to_string())
        }
    }

    /// Machine-readable tag sent next to the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation => "validation",
            RelayError::Auth => "auth",
            RelayError::Quota => "quota",
            RelayError::RateLimit => "rate_limit",
            RelayError::Upstream { .. } => "upstream",
            RelayError::Timeout => "timeout",
            RelayError::Connection => "connection",
            RelayError::Unexpected(_) => "unexpected",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file selected")]
    NoFile,

    #[error("Invalid filename")]
    InvalidFilename,

    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::NoFile | UploadError::InvalidFilename => StatusCode::BAD_REQUEST,
            // Carries 413 when the body limit was hit.
            UploadError::Multipart(e) => e.status(),
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(RelayError::from_status(401, String::new()), RelayError::Auth);
        assert_eq!(RelayError::from_status(402, String::new()), RelayError::Quota);
        assert_eq!(RelayError::from_status(429, String::new()), RelayError::RateLimit);
        assert_eq!(
            RelayError::from_status(503, "overloaded".to_string()),
            RelayError::Upstream { status: 503, body: "overloaded".to_string() }
        );
    }

    #[test]
    fn test_upstream_message_carries_status_and_body() {
        let err = RelayError::from_status(500, "boom".to_string());
        assert_eq!(err.to_string(), "HTTP 500: boom");
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            RelayError::Auth.kind(),
            RelayError::Quota.kind(),
            RelayError::RateLimit.kind(),
            RelayError::Timeout.kind(),
            RelayError::Connection.kind(),
            RelayError::Unexpected("x".into()).kind(),
        ];
        let mut deduped = kinds.to_vec();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), kinds.len());
    }

    #[test]
    fn test_validation_is_bad_request() {
        let response = RelayError::Validation.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upload_errors_status() {
        assert_eq!(UploadError::NoFile.into_response().status(), StatusCode::BAD_REQUEST);
        let io = UploadError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(io.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
