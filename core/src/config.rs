//! Client configuration.
//!
//! [`ClientBuilder`] applies settings in call order, so a later setting wins
//! over an earlier one. [`ClientConfig`] is the serde-friendly form for
//! loading the same settings from a file.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use serde::Deserialize;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::options::parse_header;
use crate::transport::{ReqwestTransport, Transport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Deserializable client settings.
///
/// ```json
/// { "base_url": "http://localhost:11434", "timeout_ms": 30000,
///   "default_headers": { "x-api-key": "secret" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Whole-call timeout. `None` keeps the 60s default; `0` disables it.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    default_headers: Vec<(String, String)>,
}

impl ClientBuilder {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Some(DEFAULT_TIMEOUT),
            transport: None,
            default_headers: Vec::new(),
        }
    }

    pub fn from_config(config: ClientConfig) -> Self {
        let mut builder = Self::new(config.base_url);
        match config.timeout_ms {
            Some(0) => builder = builder.no_timeout(),
            Some(ms) => builder = builder.timeout(Duration::from_millis(ms)),
            None => {}
        }
        for (name, value) in config.default_headers {
            builder = builder.default_header(name, value);
        }
        builder
    }

    /// Bound the wall-clock duration of every call, body read included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Replace the default transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a pre-configured reqwest client as the transport.
    pub fn http_client(self, client: reqwest::Client) -> Self {
        self.transport(Arc::new(ReqwestTransport::from_client(client)))
    }

    /// Header sent on every request; per-call options can still overwrite it.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            let (name, value) = parse_header(name, value)?;
            default_headers.insert(name, value);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new().map_err(Error::Transport)?),
        };

        Ok(Client::from_parts(
            self.base_url,
            transport,
            self.timeout,
            default_headers,
        ))
    }
}
