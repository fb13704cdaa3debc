//! Values flowing out of the transport and through the response/error chains

use std::fmt;

use reqwest::header::HeaderMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HttpError, Result};

/// Status used for failures that never produced an HTTP response
pub const NETWORK_FAILURE_STATUS: u16 = 0;

/// Raw transport result, used for both successful responses and failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    status: u16,
    status_text: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RawResponse {
    /// Create a raw response with status, status text and body
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Failure that has no HTTP response behind it (connection refused, bad URL, ...)
    pub fn network_failure(message: impl Into<String>) -> Self {
        Self::new(NETWORK_FAILURE_STATUS, message, Vec::<u8>::new())
    }

    /// Attach response headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// HTTP status code, `0` for network failures
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Status reason phrase, or the error message for network failures
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Check if the status is a success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON, `None` if it is not valid JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Body as text, `None` if it is not valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Value passed through the response and error interceptor chains
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Untouched transport result
    Raw(RawResponse),
    /// Decoded JSON value
    Json(Value),
    /// Plain text body
    Text(String),
}

impl Payload {
    /// JSON value, if this payload holds one
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Consume the payload, returning its JSON value
    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Text, if this payload holds text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Raw transport result, if no interceptor decoded it
    pub fn as_raw(&self) -> Option<&RawResponse> {
        match self {
            Payload::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    /// Check if the payload is still the raw transport result
    pub fn is_raw(&self) -> bool {
        matches!(self, Payload::Raw(_))
    }

    /// Apply `f` to a JSON payload; other payloads pass through unchanged
    pub fn map_json<F>(self, f: F) -> Self
    where
        F: FnOnce(Value) -> Value,
    {
        match self {
            Payload::Json(value) => Payload::Json(f(value)),
            other => other,
        }
    }

    /// Deserialize a JSON (or text) payload into `T`
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Payload::Json(value) => Ok(T::deserialize(value)?),
            Payload::Text(text) => Ok(T::deserialize(Value::String(text.clone()))?),
            Payload::Raw(raw) => Err(HttpError::Serialization(format!(
                "cannot deserialize undecoded response (HTTP {})",
                raw.status()
            ))),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Raw(raw) => write!(f, "HTTP {} {}", raw.status(), raw.status_text()),
            Payload::Json(value) => write!(f, "{}", value),
            Payload::Text(text) => f.write_str(text),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<RawResponse> for Payload {
    fn from(raw: RawResponse) -> Self {
        Payload::Raw(raw)
    }
}

/// Shape produced by the default error interceptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Status copied from the raw failure
    pub status: u16,
    /// Decoded error body, or the status text when the body is not JSON
    pub data: Value,
}
