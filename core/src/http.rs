//! HTTP request and response types exchanged with a [`Transport`].
//!
//! # Design
//! These types describe one request and one fully read response as plain
//! data. `Client::build_request` produces an `HttpRequest` without touching
//! the network and `Client::parse_response` consumes an `HttpResponse`, so
//! both halves of a call can be tested without a server. The transport sits
//! between them and is the only place where I/O happens.
//!
//! [`Transport`]: crate::transport::Transport

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// A fully constructed request, ready for dispatch.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// A response whose body has been read to completion.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Reason phrase from the status line when the transport reports one.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The reason phrase the server sent, falling back to the canonical one.
    pub fn status_text(&self) -> String {
        status_text(self.status, self.reason.as_deref())
    }
}

/// `reason` when present, otherwise the canonical reason phrase for
/// `status`, or an empty string for codes that have none (e.g. 299).
pub fn status_text(status: StatusCode, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => reason.to_string(),
        None => status.canonical_reason().unwrap_or_default().to_string(),
    }
}
