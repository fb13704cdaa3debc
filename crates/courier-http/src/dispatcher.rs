//! Request dispatcher
//!
//! Owns the base URL, the shared header set and the three interceptor chains,
//! and runs every verb call through the same pipeline:
//!
//! 1. resolve the URL against the base URL,
//! 2. fold the shared headers into the call's options,
//! 3. fold the body through the request chain (body-bearing verbs),
//! 4. delegate to the [`Transport`],
//! 5. fold a success through the response chain, or a failure through the
//!    error chain and re-signal it as [`HttpError::Failed`].
//!
//! Steps 1-3 run when the verb method is called. The returned future owns a
//! snapshot of everything it needs, so changing headers, the base URL or the
//! chains afterwards does not affect calls already made.

use std::{collections::HashMap, sync::Arc};

use futures::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    client::{shared_transport, Transport, TransportResult},
    config::HttpConfig,
    error::{HttpError, Result},
    interceptor::{
        default_error_interceptor, default_request_interceptor, default_response_interceptor,
        into_body, InterceptorChain,
    },
    options::{Headers, RequestOptions},
    payload::Payload,
};

static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https://|http://|www)").expect("Invalid regex"));

/// Future returned by every verb method
pub type DispatchFuture = BoxFuture<'static, Result<Payload>>;

/// Verb used for a dispatched call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

/// HTTP convenience layer over an injected [`Transport`]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    base_url: String,
    headers: HashMap<String, String>,
    request_interceptors: InterceptorChain<Value>,
    response_interceptors: InterceptorChain<Payload>,
    error_interceptors: InterceptorChain<Payload>,
}

impl RequestDispatcher {
    /// Create a dispatcher with an empty base URL, no headers and the default interceptors
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: String::new(),
            headers: HashMap::new(),
            request_interceptors: InterceptorChain::seeded(default_request_interceptor),
            response_interceptors: InterceptorChain::seeded(default_response_interceptor),
            error_interceptors: InterceptorChain::seeded(default_error_interceptor),
        }
    }

    /// Create a dispatcher seeded with the config's base URL and headers
    pub fn from_config(config: &HttpConfig, transport: Arc<dyn Transport>) -> Self {
        let mut dispatcher = Self::new(transport);
        dispatcher.set_base_url(config.base_url.clone());
        for (key, value) in &config.headers {
            dispatcher.set_header(key.clone(), value.clone());
        }
        dispatcher
    }

    /// Sets a header sent with every request
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Gets a configured header, `None` if never set or removed
    pub fn get_header_by_key(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Removes a header; no-op if absent
    pub fn remove_header(&mut self, key: &str) {
        self.headers.remove(key);
    }

    /// All configured headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Sets the prefix for relative URLs
    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.base_url = url.into();
    }

    /// Current base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Adds a request interceptor, run before every previously added one
    ///
    /// The default JSON serializer was added first, so it always runs last.
    pub fn add_request_interceptor<F>(&mut self, interceptor: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.request_interceptors = self.request_interceptors.prepend(interceptor);
    }

    /// Adds a response interceptor, run after every previously added one
    pub fn add_response_interceptor<F>(&mut self, interceptor: F)
    where
        F: Fn(Payload) -> Payload + Send + Sync + 'static,
    {
        self.response_interceptors = self.response_interceptors.append(interceptor);
    }

    /// Adds an error interceptor, run after every previously added one
    pub fn add_error_interceptor<F>(&mut self, interceptor: F)
    where
        F: Fn(Payload) -> Payload + Send + Sync + 'static,
    {
        self.error_interceptors = self.error_interceptors.append(interceptor);
    }

    /// Performs a GET request
    pub fn get(&self, url: &str, options: Option<RequestOptions>) -> DispatchFuture {
        self.dispatch(Verb::Get, url, None, options)
    }

    /// Performs a DELETE request
    pub fn delete(&self, url: &str, options: Option<RequestOptions>) -> DispatchFuture {
        self.dispatch(Verb::Delete, url, None, options)
    }

    /// Performs a POST request with `data` run through the request chain
    pub fn post<B>(&self, url: &str, data: &B, options: Option<RequestOptions>) -> DispatchFuture
    where
        B: Serialize + ?Sized,
    {
        self.dispatch_with_body(Verb::Post, url, data, options)
    }

    /// Performs a PUT request with `data` run through the request chain
    pub fn put<B>(&self, url: &str, data: &B, options: Option<RequestOptions>) -> DispatchFuture
    where
        B: Serialize + ?Sized,
    {
        self.dispatch_with_body(Verb::Put, url, data, options)
    }

    /// Performs a PATCH request with `data` run through the request chain
    pub fn patch<B>(&self, url: &str, data: &B, options: Option<RequestOptions>) -> DispatchFuture
    where
        B: Serialize + ?Sized,
    {
        self.dispatch_with_body(Verb::Patch, url, data, options)
    }

    /// URL as sent to the transport: absolute URLs untouched, others prefixed with the base URL
    pub fn resolve_url(&self, url: &str) -> String {
        if ABSOLUTE_URL.is_match(url) {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }

    /// Options as sent to the transport, with the configured headers appended
    pub fn prepare_options(&self, options: Option<RequestOptions>) -> RequestOptions {
        let mut options = options.unwrap_or_default();
        let headers = options.headers.get_or_insert_with(Headers::new);
        for (key, value) in &self.headers {
            headers.append(key.as_str(), value.as_str());
        }
        trace!(
            "Merged {} configured headers into {} total",
            self.headers.len(),
            headers.len()
        );
        options
    }

    /// Body as sent to the transport, after the request chain
    pub fn prepare_data<B>(&self, data: &B) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let value = serde_json::to_value(data)?;
        trace!(
            "Applying {} request interceptors",
            self.request_interceptors.len()
        );
        Ok(into_body(self.request_interceptors.apply(value)))
    }

    fn dispatch_with_body<B>(
        &self,
        verb: Verb,
        url: &str,
        data: &B,
        options: Option<RequestOptions>,
    ) -> DispatchFuture
    where
        B: Serialize + ?Sized,
    {
        match self.prepare_data(data) {
            Ok(body) => self.dispatch(verb, url, Some(body), options),
            Err(e) => futures::future::ready(Err(e)).boxed(),
        }
    }

    fn dispatch(
        &self,
        verb: Verb,
        url: &str,
        body: Option<String>,
        options: Option<RequestOptions>,
    ) -> DispatchFuture {
        let url = self.resolve_url(url);
        let options = self.prepare_options(options);
        let transport = Arc::clone(&self.transport);
        let response_interceptors = self.response_interceptors.clone();
        let error_interceptors = self.error_interceptors.clone();

        async move {
            debug!("Dispatching {} {}", verb.as_str(), url);
            let result: TransportResult = match (verb, body) {
                (Verb::Get, _) => transport.get(&url, options).await,
                (Verb::Delete, _) => transport.delete(&url, options).await,
                (Verb::Post, body) => transport.post(&url, body.unwrap_or_default(), options).await,
                (Verb::Put, body) => transport.put(&url, body.unwrap_or_default(), options).await,
                (Verb::Patch, body) => {
                    transport.patch(&url, body.unwrap_or_default(), options).await
                }
            };

            match result {
                Ok(raw) => Ok(response_interceptors.apply(Payload::Raw(raw))),
                Err(raw) => {
                    warn!(
                        "{} {} failed with status {}",
                        verb.as_str(),
                        url,
                        raw.status()
                    );
                    Err(HttpError::Failed(error_interceptors.apply(Payload::Raw(raw))))
                }
            }
        }
        .boxed()
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("request_interceptors", &self.request_interceptors)
            .field("response_interceptors", &self.response_interceptors)
            .field("error_interceptors", &self.error_interceptors)
            .finish_non_exhaustive()
    }
}

/// Create a dispatcher over a reqwest-backed [`HttpClient`](crate::HttpClient) built from `config`
pub fn shared_dispatcher(config: HttpConfig) -> Result<RequestDispatcher> {
    let transport = shared_transport(config.clone())?;
    Ok(RequestDispatcher::from_config(&config, transport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Failure, RawResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Call seen by the mock transport
    #[derive(Debug, Clone, PartialEq)]
    struct RecordedCall {
        method: &'static str,
        url: String,
        body: Option<String>,
        options: RequestOptions,
    }

    /// Transport that records calls and replies with a canned result
    struct MockTransport {
        calls: Mutex<Vec<RecordedCall>>,
        reply: TransportResult,
    }

    impl MockTransport {
        fn replying(reply: TransportResult) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn ok(body: &str) -> Arc<Self> {
            Self::replying(Ok(RawResponse::new(200, "OK", body)))
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        fn last_call(&self) -> RecordedCall {
            self.calls().pop().expect("transport was not called")
        }

        fn record(
            &self,
            method: &'static str,
            url: &str,
            body: Option<String>,
            options: RequestOptions,
        ) -> TransportResult {
            self.calls.lock().unwrap().push(RecordedCall {
                method,
                url: url.to_string(),
                body,
                options,
            });
            self.reply.clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(&self, url: &str, options: RequestOptions) -> TransportResult {
            self.record("GET", url, None, options)
        }

        async fn post(&self, url: &str, body: String, options: RequestOptions) -> TransportResult {
            self.record("POST", url, Some(body), options)
        }

        async fn put(&self, url: &str, body: String, options: RequestOptions) -> TransportResult {
            self.record("PUT", url, Some(body), options)
        }

        async fn patch(&self, url: &str, body: String, options: RequestOptions) -> TransportResult {
            self.record("PATCH", url, Some(body), options)
        }

        async fn delete(&self, url: &str, options: RequestOptions) -> TransportResult {
            self.record("DELETE", url, None, options)
        }
    }

    fn dispatcher(transport: &Arc<MockTransport>) -> RequestDispatcher {
        RequestDispatcher::new(Arc::clone(transport) as Arc<dyn Transport>)
    }

    #[test]
    fn test_header_lifecycle() {
        let mut dispatcher = dispatcher(&MockTransport::ok("{}"));
        assert_eq!(dispatcher.get_header_by_key("Authorization"), None);

        dispatcher.set_header("Authorization", "tok1");
        assert_eq!(dispatcher.get_header_by_key("Authorization"), Some("tok1"));

        dispatcher.set_header("Authorization", "tok2");
        assert_eq!(dispatcher.get_header_by_key("Authorization"), Some("tok2"));

        dispatcher.remove_header("Authorization");
        assert_eq!(dispatcher.get_header_by_key("Authorization"), None);

        // removing twice is fine
        dispatcher.remove_header("Authorization");
        assert!(dispatcher.headers().is_empty());
    }

    #[test]
    fn test_resolve_url() {
        let mut dispatcher = dispatcher(&MockTransport::ok("{}"));
        dispatcher.set_base_url("api/");

        assert_eq!(dispatcher.resolve_url("users"), "api/users");
        assert_eq!(dispatcher.resolve_url("/users"), "api//users");
        assert_eq!(dispatcher.resolve_url("http://ext.test/x"), "http://ext.test/x");
        assert_eq!(dispatcher.resolve_url("https://ext.test/x"), "https://ext.test/x");
        assert_eq!(dispatcher.resolve_url("www.ext.test"), "www.ext.test");
        // the prefix check is anchored and case-sensitive
        assert_eq!(dispatcher.resolve_url("HTTP://ext.test"), "api/HTTP://ext.test");
        assert_eq!(dispatcher.resolve_url("see/http://x"), "api/see/http://x");
        assert_eq!(dispatcher.resolve_url("ftp://x"), "api/ftp://x");
    }

    #[test]
    fn test_default_base_url_is_empty() {
        let dispatcher = dispatcher(&MockTransport::ok("{}"));
        assert_eq!(dispatcher.base_url(), "");
        assert_eq!(dispatcher.resolve_url("users"), "users");
    }

    #[test]
    fn test_prepare_options_appends_headers() {
        let mut dispatcher = dispatcher(&MockTransport::ok("{}"));
        dispatcher.set_header("Authorization", "tok1");

        let options = dispatcher.prepare_options(None);
        assert_eq!(options.headers.unwrap().get("Authorization"), Some("tok1"));

        let options = dispatcher
            .prepare_options(Some(RequestOptions::new().with_header("Authorization", "caller")));
        let headers = options.headers.unwrap();
        assert_eq!(headers.get_all("Authorization"), vec!["caller", "tok1"]);
    }

    #[tokio::test]
    async fn test_get_scenario() {
        let transport = MockTransport::ok(r#"{"id":1}"#);
        let mut dispatcher = dispatcher(&transport);
        dispatcher.set_base_url("api/");
        dispatcher.set_header("Authorization", "tok1");

        let result = dispatcher.get("users", None).await.unwrap();
        assert_eq!(result, Payload::Json(json!({"id": 1})));

        let call = transport.last_call();
        assert_eq!(call.method, "GET");
        assert_eq!(call.url, "api/users");
        assert_eq!(call.body, None);
        assert_eq!(
            call.options.headers.unwrap().get("Authorization"),
            Some("tok1")
        );
    }

    #[tokio::test]
    async fn test_post_serializes_body() {
        let transport = MockTransport::ok("{}");
        let dispatcher = dispatcher(&transport);

        dispatcher
            .post("items", &json!({"name": "a"}), None)
            .await
            .unwrap();

        let call = transport.last_call();
        assert_eq!(call.method, "POST");
        assert_eq!(call.url, "items");
        assert_eq!(call.body.as_deref(), Some(r#"{"name":"a"}"#));
    }

    #[tokio::test]
    async fn test_every_verb_reaches_its_transport_method() {
        let transport = MockTransport::ok("{}");
        let dispatcher = dispatcher(&transport);
        let body = json!({"k": 1});

        dispatcher.get("a", None).await.unwrap();
        dispatcher.post("b", &body, None).await.unwrap();
        dispatcher.put("c", &body, None).await.unwrap();
        dispatcher.patch("d", &body, None).await.unwrap();
        dispatcher.delete("e", None).await.unwrap();

        let methods: Vec<_> = transport.calls().iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["GET", "POST", "PUT", "PATCH", "DELETE"]);

        let bodies: Vec<_> = transport.calls().into_iter().map(|c| c.body).collect();
        let sent = Some(r#"{"k":1}"#.to_string());
        assert_eq!(bodies, vec![None, sent.clone(), sent.clone(), sent, None]);
    }

    #[tokio::test]
    async fn test_request_interceptors_are_prepended() {
        let transport = MockTransport::ok("{}");
        let mut dispatcher = dispatcher(&transport);
        dispatcher.add_request_interceptor(|v| json!({ "first": v }));
        dispatcher.add_request_interceptor(|v| json!({ "second": v }));

        dispatcher.put("x", &json!(1), None).await.unwrap();

        // most recently added runs first, serializer runs last
        assert_eq!(
            transport.last_call().body.as_deref(),
            Some(r#"{"first":{"second":1}}"#)
        );
    }

    #[tokio::test]
    async fn test_response_interceptor_runs_after_default() {
        let transport = MockTransport::ok(r#"{"some":"data"}"#);
        let mut dispatcher = dispatcher(&transport);
        dispatcher.add_response_interceptor(|p| p.map_json(|v| v["some"].clone()));

        let result = dispatcher.get("x", None).await.unwrap();
        assert_eq!(result, Payload::Json(json!("data")));
    }

    #[tokio::test]
    async fn test_response_interceptors_run_in_registration_order() {
        let transport = MockTransport::ok("[]");
        let mut dispatcher = dispatcher(&transport);
        dispatcher.add_response_interceptor(|p| p.map_json(|v| json!({ "a": v })));
        dispatcher.add_response_interceptor(|p| p.map_json(|v| json!({ "b": v })));

        let result = dispatcher.delete("x", None).await.unwrap();
        assert_eq!(result, Payload::Json(json!({"b": {"a": []}})));
    }

    #[tokio::test]
    async fn test_plain_text_response() {
        let transport = MockTransport::ok("pong");
        let dispatcher = dispatcher(&transport);

        let result = dispatcher.get("ping", None).await.unwrap();
        assert_eq!(result, Payload::Text("pong".to_string()));
    }

    #[tokio::test]
    async fn test_undecodable_response_stays_raw() {
        let raw = RawResponse::new(200, "OK", vec![0xffu8, 0xfe]);
        let transport = MockTransport::replying(Ok(raw.clone()));
        let dispatcher = dispatcher(&transport);

        let result = dispatcher.get("blob", None).await.unwrap();
        assert_eq!(result, Payload::Raw(raw));
    }

    #[tokio::test]
    async fn test_failure_goes_through_default_error_interceptor() {
        let transport = MockTransport::replying(Err(RawResponse::new(
            404,
            "Not Found",
            r#"{"msg":"nf"}"#,
        )));
        let dispatcher = dispatcher(&transport);

        let error = dispatcher.get("missing", None).await.unwrap_err();
        let failure: Failure = error.payload().unwrap().deserialize().unwrap();
        assert_eq!(
            failure,
            Failure {
                status: 404,
                data: json!({"msg": "nf"}),
            }
        );
    }

    #[tokio::test]
    async fn test_failure_without_json_body_uses_status_text() {
        let transport = MockTransport::replying(Err(RawResponse::new(502, "Bad Gateway", "")));
        let dispatcher = dispatcher(&transport);

        let error = dispatcher.post("x", &json!({}), None).await.unwrap_err();
        assert_eq!(
            error.into_payload(),
            Some(Payload::Json(json!({"status": 502, "data": "Bad Gateway"})))
        );
    }

    #[tokio::test]
    async fn test_error_interceptor_still_signals_failure() {
        let transport = MockTransport::replying(Err(RawResponse::new(
            404,
            "Not Found",
            r#"{"some":{"error":"e1"}}"#,
        )));
        let mut dispatcher = dispatcher(&transport);
        dispatcher.add_error_interceptor(|p| p.map_json(|v| v["data"]["some"].clone()));

        let result = dispatcher.patch("x", &json!(null), None).await;
        match result {
            Err(HttpError::Failed(payload)) => {
                assert_eq!(payload, Payload::Json(json!({"error": "e1"})))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_interceptors_run_in_registration_order() {
        let transport = MockTransport::replying(Err(RawResponse::new(500, "Err", "")));
        let mut dispatcher = dispatcher(&transport);
        dispatcher.add_error_interceptor(|p| p.map_json(|v| json!({ "a": v })));
        dispatcher.add_error_interceptor(|p| p.map_json(|v| json!({ "b": v })));

        let result = dispatcher.get("x", None).await;
        match result {
            Err(HttpError::Failed(payload)) => assert_eq!(
                payload,
                Payload::Json(json!({"b": {"a": {"status": 500, "data": "Err"}}}))
            ),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unserializable_body_never_reaches_transport() {
        let transport = MockTransport::ok("{}");
        let dispatcher = dispatcher(&transport);

        let mut body = HashMap::new();
        body.insert((1, 2), "tuple keys are not valid JSON object keys");

        let result = dispatcher.post("x", &body, None).await;
        assert!(matches!(result, Err(HttpError::Serialization(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_call_snapshots_configuration() {
        let transport = MockTransport::ok(r#"{"n":1}"#);
        let mut dispatcher = dispatcher(&transport);
        dispatcher.set_base_url("v1/");
        dispatcher.set_header("X-Version", "1");

        let pending = dispatcher.get("items", None);

        dispatcher.set_base_url("v2/");
        dispatcher.set_header("X-Version", "2");
        dispatcher.add_response_interceptor(|_| Payload::Text("changed".to_string()));

        let result = pending.await.unwrap();
        assert_eq!(result, Payload::Json(json!({"n": 1})));

        let call = transport.last_call();
        assert_eq!(call.url, "v1/items");
        assert_eq!(call.options.headers.unwrap().get("X-Version"), Some("1"));
    }

    #[tokio::test]
    async fn test_future_is_lazy() {
        let transport = MockTransport::ok("{}");
        let dispatcher = dispatcher(&transport);

        let pending = dispatcher.get("x", None);
        assert!(transport.calls().is_empty());

        pending.await.unwrap();
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_from_config() {
        let transport = MockTransport::ok("{}");
        let config = HttpConfig::new()
            .with_base_url("api/")
            .with_header("X-Api-Key", "k");
        let dispatcher =
            RequestDispatcher::from_config(&config, Arc::clone(&transport) as Arc<dyn Transport>);

        assert_eq!(dispatcher.base_url(), "api/");
        assert_eq!(dispatcher.get_header_by_key("X-Api-Key"), Some("k"));

        dispatcher.get("ping", None).await.unwrap();
        assert_eq!(transport.last_call().url, "api/ping");
    }

    #[test]
    fn test_shared_dispatcher() {
        let config = HttpConfig::new().with_base_url("http://localhost/");
        let dispatcher = shared_dispatcher(config).unwrap();
        assert_eq!(dispatcher.base_url(), "http://localhost/");
    }
}
