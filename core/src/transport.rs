//! Pluggable HTTP transport.
//!
//! # Design
//! The executor never talks to the network itself. It hands an
//! [`HttpRequest`] to a [`Transport`] and gets back the status line, headers
//! and a deferred [`ResponseBody`]. Keeping the body read separate lets the
//! executor tell "could not connect" apart from "connected, but the body
//! stream broke".
//!
//! Transports are shared behind `Arc<dyn Transport>` and must be safe for
//! concurrent use. Dropping the future returned by `send` (or by
//! `ResponseBody::read`) must abort the exchange.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};

use crate::error::BoxError;
use crate::http::HttpRequest;

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Execute one request and return as soon as the response head arrives.
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse, BoxError>;
}

/// Response head plus a body that has not been read yet.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    /// Reason phrase from the status line, when the transport exposes it.
    /// `None` means the canonical phrase for `status` applies.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// A body that is read on demand, at most once.
pub struct ResponseBody {
    inner: BoxFuture<'static, Result<Bytes, BoxError>>,
}

impl ResponseBody {
    /// A body that is already in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            inner: async move { Ok(bytes) }.boxed(),
        }
    }

    /// A body produced by `fut`, e.g. a streaming read from a connection.
    pub fn from_future<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = Result<Bytes, BoxError>> + Send + 'static,
    {
        Self { inner: fut.boxed() }
    }

    pub async fn read(self) -> Result<Bytes, BoxError> {
        self.inner.await
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

/// Default transport backed by a [`reqwest::Client`].
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, BoxError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Wrap a pre-configured client (proxy, TLS roots, pool limits).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse, BoxError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        // hyper only records the phrase when it differs from the canonical one.
        let reason = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned());
        let headers = response.headers().clone();
        let body = ResponseBody::from_future(async move {
            response.bytes().await.map_err(BoxError::from)
        });

        Ok(TransportResponse {
            status,
            reason,
            headers,
            body,
        })
    }
}
