//! Per-call request options.
//!
//! Options are applied in order to a [`RequestDraft`] after the URL, body
//! and default headers are in place and before dispatch. A later option
//! overwrites what an earlier one set on the same header.

use std::fmt;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{HeaderMap, Method};
use url::Url;

use crate::error::{Error, Result};

/// The mutable parts of a request while options are being applied.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl RequestDraft {
    /// Set `name` to `value`, replacing any previous values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }
}

type Mutation = dyn Fn(&mut RequestDraft) -> Result<()> + Send + Sync;

/// One mutation of an outgoing request.
#[derive(Clone)]
pub struct RequestOption {
    label: &'static str,
    apply: Arc<Mutation>,
}

impl RequestOption {
    /// Arbitrary mutation of the draft.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut RequestDraft) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            label: "custom",
            apply: Arc::new(f),
        }
    }

    pub(crate) fn apply(&self, draft: &mut RequestDraft) -> Result<()> {
        (self.apply)(draft)
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestOption").field(&self.label).finish()
    }
}

/// Set (or overwrite) a header.
pub fn with_header(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let name = name.into();
    let value = value.into();
    RequestOption {
        label: "header",
        apply: Arc::new(move |draft: &mut RequestDraft| draft.set_header(&name, &value)),
    }
}

/// `Authorization: Bearer <token>`.
pub fn with_bearer_token(token: impl Into<String>) -> RequestOption {
    let value = format!("Bearer {}", token.into());
    RequestOption {
        label: "bearer_token",
        apply: Arc::new(move |draft: &mut RequestDraft| {
            draft.set_header(AUTHORIZATION.as_str(), &value)
        }),
    }
}

/// Append a query pair to the resolved URL.
pub fn with_query(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let name = name.into();
    let value = value.into();
    RequestOption {
        label: "query",
        apply: Arc::new(move |draft: &mut RequestDraft| {
            draft.url.query_pairs_mut().append_pair(&name, &value);
            Ok(())
        }),
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::RequestConstruction(format!("invalid header name {name:?}: {e}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| Error::RequestConstruction(format!("invalid value for header {name:?}: {e}")))?;
    Ok((header_name, header_value))
}
