//! Error types for file key decoding and generation

use std::fmt;

#[derive(Debug)]
pub enum KeyError {
    /// The token is not valid URL-safe base64
    Base64(base64::DecodeError),
    /// The decoded bytes are not a `{name, salt}` object
    Json(serde_json::Error),
    /// Every generated candidate was already taken
    Exhausted { name: String, attempts: u32 },
}

impl KeyError {
    /// True when the key itself is unusable (as opposed to generation failing)
    pub fn is_malformed(&self) -> bool {
        matches!(self, KeyError::Base64(_) | KeyError::Json(_))
    }
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Base64(err) => write!(f, "Malformed file key: {}", err),
            KeyError::Json(err) => write!(f, "Malformed file key payload: {}", err),
            KeyError::Exhausted { name, attempts } => write!(
                f,
                "No unique key for {:?} after {} attempts",
                name, attempts
            ),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeyError::Base64(err) => Some(err),
            KeyError::Json(err) => Some(err),
            KeyError::Exhausted { .. } => None,
        }
    }
}

impl From<base64::DecodeError> for KeyError {
    fn from(err: base64::DecodeError) -> Self {
        KeyError::Base64(err)
    }
}

impl From<serde_json::Error> for KeyError {
    fn from(err: serde_json::Error) -> Self {
        KeyError::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, KeyError>;
