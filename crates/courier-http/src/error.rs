//! HTTP dispatcher error types

use thiserror::Error;

use crate::payload::Payload;

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, HttpError>;

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport failure, after the error interceptor chain ran
    #[error("Request failed: {0}")]
    Failed(Payload),

    /// Body or payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid proxy configuration
    #[error("Invalid proxy configuration: {0}")]
    InvalidProxy(String),

    /// Client build error
    #[error("Failed to build HTTP client: {0}")]
    BuildError(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HttpError {
    /// Payload produced by the error chain, if this is a transport failure
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            HttpError::Failed(payload) => Some(payload),
            _ => None,
        }
    }

    /// Consume the error, returning the error chain's payload
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            HttpError::Failed(payload) => Some(payload),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::Serialization(err.to_string())
    }
}
