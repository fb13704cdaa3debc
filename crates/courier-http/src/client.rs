//! Transport seam and the reqwest-backed HTTP client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use tracing::debug;

use crate::{
    config::HttpConfig,
    error::{HttpError, Result},
    options::{Headers, RequestOptions},
    payload::RawResponse,
};

/// Outcome of a transport call: the raw response, or the raw failure
pub type TransportResult = std::result::Result<RawResponse, RawResponse>;

/// Network collaborator the dispatcher delegates to
///
/// Implementations complete each call exactly once. Any failure, including
/// ones without an HTTP response, is reported as `Err(RawResponse)`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a GET request
    async fn get(&self, url: &str, options: RequestOptions) -> TransportResult;

    /// Execute a POST request
    async fn post(&self, url: &str, body: String, options: RequestOptions) -> TransportResult;

    /// Execute a PUT request
    async fn put(&self, url: &str, body: String, options: RequestOptions) -> TransportResult;

    /// Execute a PATCH request
    async fn patch(&self, url: &str, body: String, options: RequestOptions) -> TransportResult;

    /// Execute a DELETE request
    async fn delete(&self, url: &str, options: RequestOptions) -> TransportResult;
}

/// Production transport
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client with configuration
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(if config.max_redirects > 0 {
                reqwest::redirect::Policy::limited(config.max_redirects)
            } else {
                reqwest::redirect::Policy::none()
            });

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| HttpError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let inner = builder
            .build()
            .map_err(|e| HttpError::BuildError(e.to_string()))?;

        Ok(Self { inner, config })
    }

    /// Create HTTP client with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpConfig::default())
    }

    /// Get underlying reqwest client (for advanced usage)
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Get configuration
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        options: RequestOptions,
    ) -> TransportResult {
        let url = url
            .parse::<url::Url>()
            .map_err(|e| RawResponse::network_failure(format!("Invalid URL: {}", e)))?;

        let mut request = self.inner.request(method, url);

        if let Some(headers) = &options.headers {
            request = request.headers(to_header_map(headers)?);
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RawResponse::network_failure(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| RawResponse::network_failure(e.to_string()))?;

        let raw = RawResponse::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            body.to_vec(),
        )
        .with_headers(headers);

        if status.is_success() {
            Ok(raw)
        } else {
            Err(raw)
        }
    }
}

fn to_header_map(headers: &Headers) -> std::result::Result<HeaderMap, RawResponse> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RawResponse::network_failure(format!("Invalid header name {}: {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| RawResponse::network_failure(format!("Invalid value for header {}: {}", name, e)))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for HttpClient {
    async fn get(&self, url: &str, options: RequestOptions) -> TransportResult {
        debug!("HTTP GET: {}", url);
        self.request(Method::GET, url, None, options).await
    }

    async fn post(&self, url: &str, body: String, options: RequestOptions) -> TransportResult {
        debug!("HTTP POST: {}", url);
        self.request(Method::POST, url, Some(body), options).await
    }

    async fn put(&self, url: &str, body: String, options: RequestOptions) -> TransportResult {
        debug!("HTTP PUT: {}", url);
        self.request(Method::PUT, url, Some(body), options).await
    }

    async fn patch(&self, url: &str, body: String, options: RequestOptions) -> TransportResult {
        debug!("HTTP PATCH: {}", url);
        self.request(Method::PATCH, url, Some(body), options).await
    }

    async fn delete(&self, url: &str, options: RequestOptions) -> TransportResult {
        debug!("HTTP DELETE: {}", url);
        self.request(Method::DELETE, url, None, options).await
    }
}

/// Create a shared transport (Arc-wrapped for cloning)
pub fn shared_transport(config: HttpConfig) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(HttpClient::new(config)?))
}
