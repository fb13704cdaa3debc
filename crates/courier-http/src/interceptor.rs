//! Interceptor chains and their built-in defaults
//!
//! A chain is an ordered sequence of unary transforms applied as a
//! left-to-right fold: each interceptor receives the previous one's output.
//! Chains are immutable; registering an interceptor produces a new chain, so a
//! clone taken before a registration never observes it.

use std::{fmt, sync::Arc};

use serde_json::{json, Value};

use crate::payload::Payload;

/// A single transform in a chain
pub type Interceptor<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Ordered, immutable sequence of interceptors
pub struct InterceptorChain<T> {
    interceptors: Arc<[Interceptor<T>]>,
}

impl<T> InterceptorChain<T> {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            interceptors: Arc::from(Vec::<Interceptor<T>>::new()),
        }
    }

    /// Create a chain holding a single interceptor
    pub fn seeded<F>(interceptor: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::new().append(interceptor)
    }

    /// New chain with `interceptor` running before every existing one
    pub fn prepend<F>(&self, interceptor: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        let first: Interceptor<T> = Arc::new(interceptor);
        let interceptors: Vec<Interceptor<T>> = std::iter::once(first)
            .chain(self.interceptors.iter().cloned())
            .collect();
        Self {
            interceptors: Arc::from(interceptors),
        }
    }

    /// New chain with `interceptor` running after every existing one
    pub fn append<F>(&self, interceptor: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        let last: Interceptor<T> = Arc::new(interceptor);
        let interceptors: Vec<Interceptor<T>> = self
            .interceptors
            .iter()
            .cloned()
            .chain(std::iter::once(last))
            .collect();
        Self {
            interceptors: Arc::from(interceptors),
        }
    }

    /// Number of interceptors
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Check if the chain has no interceptors
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Fold `input` through every interceptor, first to last
    pub fn apply(&self, input: T) -> T {
        self.interceptors
            .iter()
            .fold(input, |acc, interceptor| interceptor(acc))
    }
}

impl<T> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for InterceptorChain<T> {
    fn clone(&self) -> Self {
        Self {
            interceptors: Arc::clone(&self.interceptors),
        }
    }
}

impl<T> fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// Serialize the outgoing body to JSON text
pub fn default_request_interceptor(body: Value) -> Value {
    Value::String(body.to_string())
}

/// Decode a raw response: JSON if possible, else text, else leave it raw
pub fn default_response_interceptor(payload: Payload) -> Payload {
    match payload {
        Payload::Raw(raw) => {
            if let Some(value) = raw.json() {
                Payload::Json(value)
            } else if let Some(text) = raw.text() {
                Payload::Text(text.to_string())
            } else {
                Payload::Raw(raw)
            }
        }
        other => other,
    }
}

/// Turn a raw failure into `{"status": .., "data": ..}`
///
/// `data` is the decoded JSON body, or the status text when the body is not JSON.
pub fn default_error_interceptor(payload: Payload) -> Payload {
    match payload {
        Payload::Raw(raw) => {
            let data = raw
                .json()
                .unwrap_or_else(|| Value::String(raw.status_text().to_string()));
            Payload::Json(json!({
                "status": raw.status(),
                "data": data,
            }))
        }
        other => other,
    }
}

/// Text actually handed to the transport for a folded request body
pub(crate) fn into_body(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
