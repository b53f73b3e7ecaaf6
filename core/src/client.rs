//! Typed JSON request executor.
//!
//! # Design
//! `Client` holds a base URL, a shared transport, a timeout and default
//! headers, and carries no mutable state between calls. A call is split into
//! three steps:
//!
//! - `build_request` resolves the URL, serializes the body and applies
//!   options. Pure; no I/O.
//! - the transport round-trip, raced against the caller's [`Context`] and
//!   the client timeout.
//! - `parse_response` classifies the status and decodes the body. Pure.
//!
//! Nothing is retried. Every failure comes back as one [`Error`] variant.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use url::Url;

use crate::config::ClientBuilder;
use crate::context::Context;
use crate::error::{Error, HttpError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::options::{RequestDraft, RequestOption};
use crate::transport::Transport;

const APPLICATION_JSON: &str = "application/json";

/// Client for a JSON HTTP API rooted at a base URL.
///
/// Cheap to clone; clones share the transport and its connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
    default_headers: HeaderMap,
}

impl Client {
    /// Client with the default reqwest transport and a 60s timeout.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::builder(base_url).build()
    }

    /// Start configuring a client rooted at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub(crate) fn from_parts(
        mut base_url: String,
        transport: Arc<dyn Transport>,
        timeout: Option<Duration>,
        default_headers: HeaderMap,
    ) -> Self {
        // Relative endpoints resolve under the last path segment of the base.
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            transport,
            timeout,
            default_headers,
        }
    }

    /// Base URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whole-call timeout; `None` means calls are bounded only by their context.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Headers sent on every request before per-call options apply.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Resolve `endpoint` against the base URL. An endpoint with its own
    /// scheme replaces the base entirely.
    pub fn resolve(&self, endpoint: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url).map_err(|source| Error::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl {
                url: self.base_url.clone(),
                source: url::ParseError::RelativeUrlWithoutBase,
            });
        }

        let invalid_endpoint = |source| Error::InvalidEndpointUrl {
            endpoint: endpoint.to_string(),
            source,
        };
        match Url::parse(endpoint) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                base.join(endpoint).map_err(invalid_endpoint)
            }
            Err(source) => Err(invalid_endpoint(source)),
        }
    }

    /// Build the request for a call without dispatching it.
    ///
    /// An empty `method` means `GET`.
    pub fn build_request<B>(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&B>,
        options: &[RequestOption],
    ) -> Result<HttpRequest>
    where
        B: Serialize + ?Sized,
    {
        let url = self.resolve(endpoint)?;

        let body = match body {
            Some(value) => Some(Bytes::from(
                serde_json::to_vec(value).map_err(Error::Marshal)?,
            )),
            None => None,
        };

        let method = parse_method(method)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        for (name, value) in &self.default_headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut draft = RequestDraft {
            method,
            url,
            headers,
        };
        for option in options {
            option.apply(&mut draft)?;
        }

        Ok(HttpRequest {
            method: draft.method,
            url: draft.url,
            headers: draft.headers,
            body,
        })
    }

    /// Classify a fully read response: non-2xx becomes [`Error::Http`],
    /// 2xx is decoded into `T`.
    ///
    /// A `204 No Content` with an empty body decodes as JSON `null`, so `()`
    /// and `Option<_>` accept it. Any other empty body is a decode error.
    pub fn parse_response<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T> {
        let no_content = response.status == StatusCode::NO_CONTENT;
        let body = check_status(response)?;
        if no_content && body.is_empty() {
            return serde_json::from_slice(b"null").map_err(Error::Decode);
        }
        serde_json::from_slice(&body).map_err(Error::Decode)
    }

    /// Send one request and decode the JSON response into `T`.
    ///
    /// Fails with [`Error::Cancelled`] without any I/O if `ctx` is already
    /// done, and aborts the in-flight exchange if `ctx` is cancelled or the
    /// deadline (context or client timeout, whichever is earlier) passes.
    pub async fn execute<T, B>(
        &self,
        ctx: &Context,
        method: &str,
        endpoint: &str,
        body: Option<&B>,
        options: &[RequestOption],
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.build_request(method, endpoint, body, options)?;

        if let Some(cause) = ctx.cause() {
            return Err(Error::Cancelled(cause));
        }

        let started = Instant::now();
        // A timeout too large to represent as an instant never fires.
        let limit = self
            .timeout
            .and_then(|timeout| started.checked_add(timeout));
        tracing::debug!(method = %request.method, url = %request.url, "dispatching request");

        let response = tokio::select! {
            biased;
            cause = ctx.done_by(limit) => {
                tracing::debug!(%cause, "request aborted");
                return Err(Error::Cancelled(cause));
            }
            response = self.exchange(request) => response?,
        };

        tracing::debug!(
            status = response.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );
        self.parse_response(response)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        endpoint: &str,
        options: &[RequestOption],
    ) -> Result<T> {
        self.execute::<T, ()>(ctx, Method::GET.as_str(), endpoint, None, options)
            .await
    }

    pub async fn post<T, B>(
        &self,
        ctx: &Context,
        endpoint: &str,
        body: &B,
        options: &[RequestOption],
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ctx, Method::POST.as_str(), endpoint, Some(body), options)
            .await
    }

    pub async fn put<T, B>(
        &self,
        ctx: &Context,
        endpoint: &str,
        body: &B,
        options: &[RequestOption],
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ctx, Method::PUT.as_str(), endpoint, Some(body), options)
            .await
    }

    /// `DELETE`, optionally with a JSON payload for APIs that require one.
    pub async fn delete<T, B>(
        &self,
        ctx: &Context,
        endpoint: &str,
        body: Option<&B>,
        options: &[RequestOption],
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ctx, Method::DELETE.as_str(), endpoint, body, options)
            .await
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(Error::Transport)?;

        let status = response.status;
        let body = response
            .body
            .read()
            .await
            .map_err(|source| Error::ResponseBody {
                status: status.as_u16(),
                source,
            })?;

        Ok(HttpResponse {
            status,
            reason: response.reason,
            headers: response.headers,
            body,
        })
    }
}

fn parse_method(method: &str) -> Result<Method> {
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.as_bytes())
        .map_err(|e| Error::RequestConstruction(format!("invalid method {method:?}: {e}")))
}

/// Map statuses outside 200..=299 to [`HttpError`], keeping the body verbatim.
fn check_status(response: HttpResponse) -> Result<Bytes> {
    if response.status.is_success() {
        return Ok(response.body);
    }
    Err(HttpError {
        status: response.status.as_u16(),
        status_text: response.status_text(),
        body: response.body,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelCause;
    use crate::error::{BoxError, ErrorKind};
    use crate::options::{with_bearer_token, with_header, with_query};
    use crate::transport::{ResponseBody, TransportResponse};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Data {
        message: String,
        value: i64,
    }

    /// Scripted transport that records what it was asked to send.
    #[derive(Debug, Default)]
    struct FakeTransport {
        calls: AtomicUsize,
        last: Mutex<Option<HttpRequest>>,
        reply: Mutex<Option<Reply>>,
    }

    #[derive(Debug)]
    enum Reply {
        Ok(u16, &'static str),
        ConnectFails,
        BodyFails(u16),
        Hang,
    }

    impl FakeTransport {
        fn replying(reply: Reply) -> Arc<Self> {
            let transport = FakeTransport::default();
            *transport.reply.lock().unwrap() = Some(reply);
            Arc::new(transport)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: HttpRequest) -> std::result::Result<TransportResponse, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request);
            let reply = self.reply.lock().unwrap().take();
            let (status, body) = match reply {
                Some(Reply::Ok(status, body)) => (status, ResponseBody::from_bytes(body)),
                Some(Reply::BodyFails(status)) => (
                    status,
                    ResponseBody::from_future(async { Err("connection reset".into()) }),
                ),
                Some(Reply::ConnectFails) => return Err("connection refused".into()),
                Some(Reply::Hang) => std::future::pending().await,
                None => return Err("no scripted reply".into()),
            };
            Ok(TransportResponse {
                status: StatusCode::from_u16(status)?,
                reason: None,
                headers: HeaderMap::new(),
                body,
            })
        }
    }

    fn client() -> Client {
        client_with(FakeTransport::replying(Reply::Ok(200, "{}")))
    }

    fn client_with(transport: Arc<FakeTransport>) -> Client {
        Client::builder("http://localhost:3000")
            .transport(transport)
            .build()
            .unwrap()
    }

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse::new(StatusCode::from_u16(status).unwrap(), body)
    }

    // --- build_request ---

    #[test]
    fn base_url_gains_trailing_slash() {
        assert_eq!(client().base_url(), "http://localhost:3000/");
    }

    #[test]
    fn build_get_produces_correct_request() {
        let req = client()
            .build_request::<()>("GET", "/data", None, &[])
            .unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url.as_str(), "http://localhost:3000/data");
        assert_eq!(req.headers[CONTENT_TYPE], APPLICATION_JSON);
        assert!(req.body.is_none());
    }

    #[test]
    fn relative_endpoint_resolves_under_base_path() {
        let c = Client::builder("http://localhost:3000/api/v1")
            .transport(FakeTransport::replying(Reply::Hang))
            .build()
            .unwrap();
        let req = c.build_request::<()>("GET", "items", None, &[]).unwrap();
        assert_eq!(req.url.as_str(), "http://localhost:3000/api/v1/items");
        let req = c.build_request::<()>("GET", "/items", None, &[]).unwrap();
        assert_eq!(req.url.as_str(), "http://localhost:3000/items");
    }

    #[test]
    fn absolute_endpoint_overrides_base() {
        let req = client()
            .build_request::<()>("GET", "http://other:9000/full/path?x=1", None, &[])
            .unwrap();
        assert_eq!(req.url.as_str(), "http://other:9000/full/path?x=1");
    }

    #[test]
    fn build_post_serializes_body() {
        let body = serde_json::json!({"prompt": "Why is the sky blue?", "n": 2});
        let req = client()
            .build_request("POST", "/api/generate", Some(&body), &[])
            .unwrap();
        assert_eq!(req.method, Method::POST);
        let sent: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn options_apply_in_order_after_defaults() {
        let c = Client::builder("http://localhost:3000")
            .default_header("x-env", "dev")
            .transport(FakeTransport::replying(Reply::Hang))
            .build()
            .unwrap();
        let req = c
            .build_request::<()>(
                "GET",
                "/data",
                None,
                &[
                    with_header("X-Env", "staging"),
                    with_bearer_token("a"),
                    with_bearer_token("b"),
                    with_query("page", "2"),
                ],
            )
            .unwrap();
        assert_eq!(req.headers["x-env"], "staging");
        assert_eq!(req.headers["authorization"], "Bearer b");
        assert_eq!(req.url.query(), Some("page=2"));
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let c = Client::builder("not a url")
            .transport(FakeTransport::replying(Reply::Hang))
            .build()
            .unwrap();
        let err = c.build_request::<()>("GET", "/data", None, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidBaseUrl { .. }));
    }

    #[test]
    fn invalid_endpoint_url_is_reported() {
        let err = client()
            .build_request::<()>("GET", "http://[::1", None, &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEndpointUrl { .. }));
    }

    #[test]
    fn unserializable_body_is_marshal_error() {
        let mut body = HashMap::new();
        body.insert((1, 2), "tuple keys are not JSON object keys");
        let err = client()
            .build_request("POST", "/data", Some(&body), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Marshal(_)));
    }

    #[test]
    fn invalid_method_is_construction_error() {
        let err = client()
            .build_request::<()>("BAD METHOD", "/data", None, &[])
            .unwrap_err();
        assert!(matches!(err, Error::RequestConstruction(_)));
    }

    #[test]
    fn empty_method_defaults_to_get() {
        let req = client().build_request::<()>("", "/data", None, &[]).unwrap();
        assert_eq!(req.method, Method::GET);
    }

    // --- parse_response ---

    #[test]
    fn parse_success() {
        let data: Data = client()
            .parse_response(response(200, r#"{"message":"success","value":123}"#))
            .unwrap();
        assert_eq!(
            data,
            Data {
                message: "success".to_string(),
                value: 123
            }
        );
    }

    #[test]
    fn parse_not_found_keeps_body() {
        let err = client()
            .parse_response::<Data>(response(404, r#"{"error":"not found"}"#))
            .unwrap_err();
        let http = err.as_http().unwrap();
        assert_eq!(http.status, 404);
        assert_eq!(http.status_text, "Not Found");
        assert_eq!(http.body_text(), r#"{"error":"not found"}"#);
    }

    #[test]
    fn parse_non_json_error_body() {
        let err = client()
            .parse_response::<Data>(response(500, "internal failure"))
            .unwrap_err();
        assert_eq!(err.as_http().unwrap().body, Bytes::from_static(b"internal failure"));
    }

    #[test]
    fn parse_redirect_status_is_http_error() {
        let err = client()
            .parse_response::<Data>(response(304, ""))
            .unwrap_err();
        assert_eq!(err.as_http().map(|e| e.status), Some(304));
    }

    #[test]
    fn parse_type_mismatch_is_decode_error() {
        let err = client()
            .parse_response::<Data>(response(200, r#"{"message":"success","value":"not-an-int"}"#))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn parse_bad_json_is_decode_error() {
        let err = client()
            .parse_response::<Data>(response(200, "not json"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn parse_no_content_into_unit_or_option() {
        client().parse_response::<()>(response(204, "")).unwrap();
        let none: Option<Data> = client().parse_response(response(204, "")).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn parse_no_content_into_struct_is_decode_error() {
        let err = client().parse_response::<Data>(response(204, "")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn parse_empty_ok_body_is_decode_error() {
        let err = client()
            .parse_response::<Option<Data>>(response(200, ""))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = client()
            .parse_response::<serde_json::Value>(response(200, "  \n"))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = client().parse_response::<()>(response(200, "")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn parse_error_keeps_server_reason_phrase() {
        let err = client()
            .parse_response::<Data>(response(404, "").with_reason("Gone Fishing"))
            .unwrap_err();
        assert_eq!(err.as_http().unwrap().status_text, "Gone Fishing");

        let err = client()
            .parse_response::<Data>(response(599, "").with_reason("Custom Failure"))
            .unwrap_err();
        let http = err.as_http().unwrap();
        assert_eq!(http.status, 599);
        assert_eq!(http.status_text, "Custom Failure");
    }

    // --- execute ---

    #[tokio::test]
    async fn execute_sends_request_and_decodes() {
        let transport = FakeTransport::replying(Reply::Ok(200, r#"{"message":"ok","value":1}"#));
        let c = client_with(transport.clone());
        let data: Data = c
            .post(&Context::background(), "/data", &serde_json::json!({"a": 1}), &[])
            .await
            .unwrap();
        assert_eq!(data.value, 1);

        let sent = transport.last.lock().unwrap().take().unwrap();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.body.as_deref(), Some(&br#"{"a":1}"#[..]));
    }

    #[tokio::test]
    async fn delete_without_body_sends_none() {
        let transport = FakeTransport::replying(Reply::Ok(204, ""));
        let c = client_with(transport.clone());
        c.delete::<(), ()>(&Context::background(), "/items/1", None, &[])
            .await
            .unwrap();
        let sent = transport.last.lock().unwrap().take().unwrap();
        assert_eq!(sent.method, Method::DELETE);
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn pre_cancelled_context_never_dispatches() {
        let transport = FakeTransport::replying(Reply::Ok(200, "{}"));
        let c = client_with(transport.clone());
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let err = c.get::<Data>(&ctx, "/data", &[]).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn construction_errors_win_over_cancelled_context() {
        let transport = FakeTransport::replying(Reply::Ok(200, "{}"));
        let c = client_with(transport.clone());
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let err = c
            .execute::<Data, ()>(&ctx, "NOT VALID", "/data", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestConstruction(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_flight_aborts() {
        let transport = FakeTransport::replying(Reply::Hang);
        let c = client_with(transport.clone());
        let (ctx, cancel) = Context::background().with_cancel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let err = c.get::<Data>(&ctx, "/data", &[]).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_timeout_reports_deadline_exceeded() {
        let c = Client::builder("http://localhost:3000")
            .timeout(Duration::from_millis(50))
            .transport(FakeTransport::replying(Reply::Hang))
            .build()
            .unwrap();
        let err = c
            .get::<Data>(&Context::background(), "/data", &[])
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn unbounded_client_timeout_does_not_overflow() {
        let c = Client::builder("http://localhost:3000")
            .timeout(Duration::MAX)
            .transport(FakeTransport::replying(Reply::Ok(200, r#"{"message":"ok","value":7}"#)))
            .build()
            .unwrap();
        let ctx = Context::background().with_timeout(Duration::MAX);
        let data: Data = c.get(&ctx, "/data", &[]).await.unwrap();
        assert_eq!(data.value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn context_deadline_reports_deadline_exceeded() {
        let c = client_with(FakeTransport::replying(Reply::Hang));
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let err = c.get::<Data>(&ctx, "/data", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(CancelCause::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn transport_failure_is_wrapped() {
        let c = client_with(FakeTransport::replying(Reply::ConnectFails));
        let err = c
            .get::<Data>(&Context::background(), "/data", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn body_read_failure_on_error_status_is_not_http_error() {
        let c = client_with(FakeTransport::replying(Reply::BodyFails(500)));
        let err = c
            .get::<Data>(&Context::background(), "/data", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResponseBody { status: 500, .. }));
        assert!(err.as_http().is_none());
    }

    #[tokio::test]
    async fn body_read_failure_on_success_status() {
        let c = client_with(FakeTransport::replying(Reply::BodyFails(200)));
        let err = c
            .get::<Data>(&Context::background(), "/data", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseBody);
    }
}
