//! Network fetch primitive.
//!
//! The engine never talks to the network directly; it goes through a
//! [`Fetcher`], which performs one request against one endpoint and classifies
//! the failure, and which can cheaply probe an endpoint for liveness.
//! [`HttpFetcher`] is the production implementation.

mod http;

pub use http::HttpFetcher;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;

use reelfetch_common::{Error, Result};

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A request relative to an endpoint base URL.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Path appended to the endpoint (an absolute `http(s)://` URL is used as-is).
    pub path: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Full URL of this request against `endpoint`.
    pub fn url_for(&self, endpoint: &str) -> String {
        join_url(endpoint, &self.path)
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub endpoint: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub latency: Duration,
}

impl FetchResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::permanent(
                self.endpoint.clone(),
                Some(self.status),
                format!("invalid JSON body: {e}"),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The host answered. `status` may be 403/404; reachability is all a
    /// probe establishes.
    Reachable { latency: Duration, status: u16 },
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

// ---------------------------------------------------------------------------
// Fetcher trait
// ---------------------------------------------------------------------------

/// Performs single requests against a single endpoint.
///
/// Implementations classify failures into [`Error::Transient`],
/// [`Error::Permanent`] and [`Error::Timeout`]; retrying and failover are the
/// caller's business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short identifier for logs (e.g. `"http"`).
    fn name(&self) -> &'static str;

    /// Send `request` to `endpoint`.
    async fn fetch(&self, endpoint: &str, request: &FetchRequest) -> Result<FetchResponse>;

    /// Check that `endpoint` answers at all within `timeout`.
    async fn probe(&self, endpoint: &str, timeout: Duration) -> ProbeOutcome;
}

/// Join an endpoint base URL and a relative path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map an HTTP status to an error, or `None` when it is a success.
///
/// 408, 429 and 5xx are transient; any other 4xx is a permanent rejection.
pub fn classify_status(endpoint: &str, status: u16) -> Option<Error> {
    match status {
        200..=399 => None,
        408 | 429 => Some(Error::transient(endpoint, format!("HTTP {status}"))),
        400..=499 => Some(Error::permanent(
            endpoint,
            Some(status),
            status_reason(status),
        )),
        _ => Some(Error::transient(endpoint, format!("HTTP {status}"))),
    }
}

fn status_reason(status: u16) -> String {
    match status {
        400 => "bad request".to_string(),
        401 => "unauthorized".to_string(),
        403 => "forbidden".to_string(),
        404 => "not found".to_string(),
        _ => format!("client error {status}"),
    }
}

// ---------------------------------------------------------------------------
// Scripted fetcher for unit tests
// ---------------------------------------------------------------------------
