//! Error types for the PQDIF blob store

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pqdif_file_key::KeyError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum BlobStoreError {
    /// The store has not finished initializing
    NotReady,
    /// An explicit key was sent with more than one file
    InvalidCommitBatch { files: usize },
    Key(KeyError),
    BadRequest(String),
    /// The request body exceeded the configured upload limit
    PayloadTooLarge(String),
    Upstream(Box<reqwest::Error>),
    Io(Box<std::io::Error>),
    Config(String),
}

impl BlobStoreError {
    fn status(&self) -> StatusCode {
        match self {
            BlobStoreError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            BlobStoreError::InvalidCommitBatch { .. } | BlobStoreError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            BlobStoreError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            BlobStoreError::Key(err) if err.is_malformed() => StatusCode::BAD_REQUEST,
            BlobStoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for BlobStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobStoreError::NotReady => write!(f, "Blob store is not ready"),
            BlobStoreError::InvalidCommitBatch { files } => write!(
                f,
                "An explicit pqdifKey must accompany exactly one file (got {})",
                files
            ),
            BlobStoreError::Key(err) => write!(f, "Key error: {}", err),
            BlobStoreError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            BlobStoreError::PayloadTooLarge(msg) => write!(f, "Upload too large: {}", msg),
            BlobStoreError::Upstream(err) => write!(f, "Upstream error: {}", err),
            BlobStoreError::Io(err) => write!(f, "IO error: {}", err),
            BlobStoreError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BlobStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobStoreError::Key(err) => Some(err),
            BlobStoreError::Upstream(err) => Some(err.as_ref()),
            BlobStoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for BlobStoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Blob store request failed");
        } else {
            tracing::debug!(error = %self, "Rejected blob store request");
        }

        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<KeyError> for BlobStoreError {
    fn from(err: KeyError) -> Self {
        BlobStoreError::Key(err)
    }
}

impl From<reqwest::Error> for BlobStoreError {
    fn from(err: reqwest::Error) -> Self {
        BlobStoreError::Upstream(Box::new(err))
    }
}

impl From<std::io::Error> for BlobStoreError {
    fn from(err: std::io::Error) -> Self {
        BlobStoreError::Io(Box::new(err))
    }
}

impl From<axum::extract::multipart::MultipartError> for BlobStoreError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            BlobStoreError::PayloadTooLarge(err.body_text())
        } else {
            BlobStoreError::BadRequest(err.body_text())
        }
    }
}

impl From<tracing_subscriber::filter::ParseError> for BlobStoreError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        BlobStoreError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BlobStoreError>;
