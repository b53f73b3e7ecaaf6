//! Error types for the request executor.
//!
//! # Design
//! Every failure is reported as exactly one [`Error`] variant naming the
//! stage that failed. Non-2xx responses get their own [`HttpError`] type so
//! callers can pull out the status and raw body without string parsing; all
//! other variants wrap the underlying cause.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::context::CancelCause;

/// Boxed error produced by a [`Transport`](crate::transport::Transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by [`Client`](crate::Client) calls.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid endpoint URL {endpoint:?}: {source}")]
    InvalidEndpointUrl {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// The request body could not be serialized to JSON.
    #[error("error marshaling JSON: {0}")]
    Marshal(#[source] serde_json::Error),

    /// Invalid method, header name or header value.
    #[error("error creating request: {0}")]
    RequestConstruction(String),

    /// Connection refused, DNS failure or other I/O failure during dispatch.
    #[error("error making request: {0}")]
    Transport(#[source] BoxError),

    /// The context was cancelled or a deadline passed, before dispatch or
    /// while the call was in flight.
    #[error("request aborted: {0}")]
    Cancelled(CancelCause),

    /// The response body could not be read to completion. `status` is the
    /// status line that was received before the read failed.
    #[error("received status {status}, but failed to read response body: {source}")]
    ResponseBody {
        status: u16,
        #[source]
        source: BoxError,
    },

    /// The server answered outside the 2xx range.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A 2xx body was not valid JSON or did not match the declared type.
    #[error("error decoding response JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Failure stage of an [`Error`], for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidBaseUrl,
    InvalidEndpointUrl,
    Marshal,
    RequestConstruction,
    Transport,
    Cancelled,
    ResponseBody,
    Http,
    Decode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidBaseUrl { .. } => ErrorKind::InvalidBaseUrl,
            Error::InvalidEndpointUrl { .. } => ErrorKind::InvalidEndpointUrl,
            Error::Marshal(_) => ErrorKind::Marshal,
            Error::RequestConstruction(_) => ErrorKind::RequestConstruction,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::ResponseBody { .. } => ErrorKind::ResponseBody,
            Error::Http(_) => ErrorKind::Http,
            Error::Decode(_) => ErrorKind::Decode,
        }
    }

    /// The structured non-2xx error, if this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Error::Http(e) => Some(e),
            _ => None,
        }
    }

    /// True when a context deadline or the client timeout expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Cancelled(CancelCause::DeadlineExceeded))
    }

    /// True when the caller cancelled the context explicitly.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(CancelCause::Cancelled))
    }
}

/// A response outside the 2xx range, captured verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("http error: status code {status}, status {status_text}, body: {}", String::from_utf8_lossy(.body))]
pub struct HttpError {
    pub status: u16,
    /// Reason phrase, e.g. `"Not Found"`.
    pub status_text: String,
    pub body: Bytes,
}

impl HttpError {
    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the error body as a JSON error payload.
    pub fn json<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
