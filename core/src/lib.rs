//! Typed JSON requests over a pluggable HTTP transport.
//!
//! # Overview
//! A [`Client`] resolves an endpoint against its base URL, serializes an
//! optional JSON body, applies per-call [`RequestOption`]s, dispatches
//! through a [`Transport`] and decodes the JSON response into the type the
//! caller names at the call site.
//!
//! ```rust,ignore
//! use jsonhttp::{options::with_bearer_token, Client, Context};
//!
//! #[derive(serde::Deserialize)]
//! struct Generated { response: String }
//!
//! let client = Client::builder("http://localhost:11434")
//!     .timeout(Duration::from_secs(30))
//!     .build()?;
//! let ctx = Context::background().with_timeout(Duration::from_secs(10));
//! let body = serde_json::json!({ "prompt": "Why is the sky blue?" });
//!
//! match client
//!     .post::<Generated, _>(&ctx, "/api/generate", &body, &[with_bearer_token("my-token")])
//!     .await
//! {
//!     Ok(generated) => println!("{}", generated.response),
//!     Err(jsonhttp::Error::Http(e)) => eprintln!("status {}: {}", e.status, e.body_text()),
//!     Err(e) => eprintln!("request failed: {e}"),
//! }
//! ```
//!
//! # Design
//! - `Client` is stateless between calls; clones share one transport.
//! - `build_request` and `parse_response` are pure, so the I/O boundary is
//!   explicit and both halves are testable without a server.
//! - Cancellation comes from the caller's [`Context`]; the client timeout
//!   bounds the whole call regardless of which transport is plugged in.
//! - No retries. Each failure is one [`Error`] variant.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod options;
pub mod transport;

pub use client::Client;
pub use config::{ClientBuilder, ClientConfig, DEFAULT_TIMEOUT};
pub use context::{CancelCause, CancelHandle, Context};
pub use error::{BoxError, Error, ErrorKind, HttpError, Result};
pub use crate::http::{HttpRequest, HttpResponse};
pub use options::{with_bearer_token, with_header, with_query, RequestDraft, RequestOption};
pub use transport::{ReqwestTransport, ResponseBody, Transport, TransportResponse};
