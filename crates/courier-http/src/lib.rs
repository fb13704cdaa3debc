//! Courier HTTP dispatcher
//!
//! A small convenience layer over an injected HTTP transport. It keeps a base
//! URL and a shared header set, and runs every call through three ordered
//! interceptor chains (request, response, error).
//!
//! ## Features
//!
//! - **Trait-based transport**: anything implementing `Transport`; `HttpClient` is the reqwest one
//! - **URL resolution**: relative URLs are prefixed with the base URL
//! - **Shared headers**: appended to every call's options
//! - **Interceptor chains**: request interceptors run newest-first, response and error
//!   interceptors run oldest-first
//! - **Snapshot semantics**: each call captures configuration when it is made
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_http::{HttpClient, HttpConfig, Payload, RequestDispatcher};
//! use serde_json::json;
//!
//! async fn example() -> courier_http::Result<()> {
//!     let transport = Arc::new(HttpClient::new(HttpConfig::default())?);
//!     let mut dispatcher = RequestDispatcher::new(transport);
//!     dispatcher.set_base_url("https://api.example.com/");
//!     dispatcher.set_header("Authorization", "Bearer token");
//!     dispatcher.add_response_interceptor(|p: Payload| p.map_json(|v| v["data"].clone()));
//!
//!     let user = dispatcher.get("users/1", None).await?;
//!     dispatcher.post("users", &json!({"name": "a"}), None).await?;
//!     println!("{}", user);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod interceptor;
pub mod options;
pub mod payload;

pub use client::{shared_transport, HttpClient, Transport, TransportResult};
pub use config::HttpConfig;
pub use dispatcher::{shared_dispatcher, DispatchFuture, RequestDispatcher};
pub use error::{HttpError, Result};
pub use interceptor::{
    default_error_interceptor, default_request_interceptor, default_response_interceptor,
    Interceptor, InterceptorChain,
};
pub use options::{Headers, RequestOptions};
pub use payload::{Failure, Payload, RawResponse, NETWORK_FAILURE_STATUS};
