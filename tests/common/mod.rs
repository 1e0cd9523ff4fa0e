//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which starts two [`MockServer`] origins (a primary
//! and a fallback) and builds a [`FetchEngine`] over the real HTTP fetcher
//! pointed at them. Timings are shrunk so retry paths finish quickly.

#![allow(dead_code)]

use reelfetch::config::{Config, RetryPolicy};
use reelfetch::FetchEngine;
use wiremock::MockServer;

/// Base path every mock origin serves under, mirroring the image CDN layout.
pub const BASE_PATH: &str = "/t/p/";

/// Two mock origins and an engine wired to them.
pub struct TestHarness {
    pub engine: FetchEngine,
    pub primary: MockServer,
    pub fallback: MockServer,
}

impl TestHarness {
    /// Start both origins and an engine with fast test timings.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Like [`new`](Self::new), letting the caller adjust the config first.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;

        let mut config = test_config(&primary, &fallback);
        adjust(&mut config);
        let engine = FetchEngine::new(config).expect("failed to build engine");

        Self {
            engine,
            primary,
            fallback,
        }
    }

    /// Endpoint base URL of the primary origin.
    pub fn primary_url(&self) -> String {
        endpoint_url(&self.primary)
    }

    /// Endpoint base URL of the fallback origin.
    pub fn fallback_url(&self) -> String {
        endpoint_url(&self.fallback)
    }
}

pub fn endpoint_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), BASE_PATH)
}

/// Full request path for a resource under [`BASE_PATH`].
pub fn resource_path(resource: &str) -> String {
    format!("{}{}", BASE_PATH, resource)
}

/// Default config pointed at the mock origins, with millisecond-scale delays.
pub fn test_config(primary: &MockServer, fallback: &MockServer) -> Config {
    let mut config = Config::default();
    config.endpoints.primary = vec![endpoint_url(primary)];
    config.endpoints.fallback = vec![endpoint_url(fallback)];
    config.retry = fast_retry(3);
    config.rate_limit.rate_limit_interval_ms = 1;
    config.http.timeout_secs = 5;
    config.health.probe_timeout_secs = 2;
    config
}

/// Retry policy with `max_retries` and a few milliseconds of backoff.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 5,
        cap_ms: 50,
        ..Default::default()
    }
}
