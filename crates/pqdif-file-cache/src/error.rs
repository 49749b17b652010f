//! Error types for the PQDIF file cache

use crate::codec::CodecError;
use pqdif_file_key::{FileKey, KeyError};
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum FileCacheError {
    /// No decoded file exists for the key
    NotFound(FileKey),
    /// The persistent tier answered with an unexpected status
    Transport { status: u16, context: String },
    Http(Box<reqwest::Error>),
    /// The persistent tier answered 2xx with a body we cannot read
    InvalidResponse(String),
    /// The persistent tier did not signal readiness in time
    WorkerNotReady(Duration),
    MalformedKey(KeyError),
    /// An explicit key was paired with more than one file
    InvalidCommitBatch { files: usize },
    Codec(CodecError),
    Io(Box<std::io::Error>),
    /// The operation observed its cancellation token
    Cancelled,
}

impl FileCacheError {
    /// Caller mistakes that must not be retried
    pub fn is_client_error(&self) -> bool {
        match self {
            FileCacheError::InvalidCommitBatch { .. } | FileCacheError::MalformedKey(_) => true,
            FileCacheError::Transport { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }

    /// Failures a caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            FileCacheError::WorkerNotReady(_) | FileCacheError::Http(_) => true,
            FileCacheError::Transport { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for FileCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCacheError::NotFound(key) => write!(f, "No decoded file for key {}", key),
            FileCacheError::Transport { status, context } => {
                write!(f, "Invalid response {}: status {}", context, status)
            }
            FileCacheError::Http(err) => write!(f, "HTTP error: {}", err),
            FileCacheError::InvalidResponse(msg) => write!(f, "Invalid response body: {}", msg),
            FileCacheError::WorkerNotReady(timeout) => write!(
                f,
                "Timeout waiting for the persistent tier to become ready ({:?})",
                timeout
            ),
            FileCacheError::MalformedKey(err) => write!(f, "{}", err),
            FileCacheError::InvalidCommitBatch { files } => write!(
                f,
                "An explicit key must accompany exactly one file (got {})",
                files
            ),
            FileCacheError::Codec(err) => write!(f, "Codec error: {}", err),
            FileCacheError::Io(err) => write!(f, "IO error: {}", err),
            FileCacheError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for FileCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileCacheError::Http(err) => Some(err.as_ref()),
            FileCacheError::MalformedKey(err) => Some(err),
            FileCacheError::Codec(err) => Some(err),
            FileCacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FileCacheError {
    fn from(err: reqwest::Error) -> Self {
        FileCacheError::Http(Box::new(err))
    }
}

impl From<KeyError> for FileCacheError {
    fn from(err: KeyError) -> Self {
        FileCacheError::MalformedKey(err)
    }
}

impl From<CodecError> for FileCacheError {
    fn from(err: CodecError) -> Self {
        FileCacheError::Codec(err)
    }
}

impl From<std::io::Error> for FileCacheError {
    fn from(err: std::io::Error) -> Self {
        FileCacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FileCacheError>;
