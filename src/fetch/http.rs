//! `reqwest`-backed [`Fetcher`].
//!
//! One pooled client is shared by every endpoint. Each request carries a user
//! agent drawn at random from the configured list.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use tokio::time::Instant;
use tracing::debug;

use reelfetch_common::{Error, Result};

use super::{classify_status, join_url, FetchRequest, FetchResponse, Fetcher, ProbeOutcome};
use crate::config::{Config, HttpConfig};

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
    request_timeout: Duration,
    probe_path: String,
}

impl HttpFetcher {
    pub fn new(http: &HttpConfig, probe_path: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.timeout())
            .pool_max_idle_per_host(http.pool_max_idle_per_host)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agents: http.user_agents.clone(),
            request_timeout: http.timeout(),
            probe_path: probe_path.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.http, config.health.probe_path.clone())
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    fn classify_send_error(&self, endpoint: &str, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::timeout(endpoint, self.request_timeout)
        } else if err.is_builder() {
            Error::permanent(endpoint, None, err.to_string())
        } else {
            Error::transient(endpoint, err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, endpoint: &str, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url_for(endpoint);
        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(agent) = self.pick_user_agent() {
            builder = builder.header(USER_AGENT, agent);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let started = Instant::now();
        let resp = builder
            .send()
            .await
            .map_err(|e| self.classify_send_error(endpoint, &e))?;

        let status = resp.status().as_u16();
        if let Some(err) = classify_status(endpoint, status) {
            debug!(url = %url, status, "Request rejected");
            return Err(err);
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = resp
            .bytes()
            .await
            .map_err(|e| self.classify_send_error(endpoint, &e))?;
        let latency = started.elapsed();

        debug!(
            url = %url,
            status,
            bytes = body.len(),
            latency_ms = latency.as_millis() as u64,
            "Request succeeded"
        );

        Ok(FetchResponse {
            endpoint: endpoint.to_string(),
            url,
            status,
            content_type,
            body,
            latency,
        })
    }

    async fn probe(&self, endpoint: &str, timeout: Duration) -> ProbeOutcome {
        let url = join_url(endpoint, &self.probe_path);
        let mut builder = self.client.request(Method::HEAD, &url).timeout(timeout);
        if let Some(agent) = self.pick_user_agent() {
            builder = builder.header(USER_AGENT, agent);
        }

        let started = Instant::now();
        match builder.send().await {
            Ok(resp) => {
                let status = resp.status();
                // 403/404 still prove the host is up.
                if status.is_success() || status.as_u16() == 403 || status.as_u16() == 404 {
                    ProbeOutcome::Reachable {
                        latency: started.elapsed(),
                        status: status.as_u16(),
                    }
                } else {
                    ProbeOutcome::Unreachable {
                        reason: format!("HTTP {}", status.as_u16()),
                    }
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::Unreachable {
                reason: format!("timed out after {}ms", timeout.as_millis()),
            },
            Err(e) => ProbeOutcome::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_from_default_config() {
        let fetcher = HttpFetcher::from_config(&Config::default()).unwrap();
        assert_eq!(fetcher.name(), "http");
        assert_eq!(fetcher.probe_path, "w185/test.jpg");
        assert_eq!(fetcher.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_user_agent_rotation_draws_from_config() {
        let config = HttpConfig {
            user_agents: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&config, "probe").unwrap();
        for _ in 0..20 {
            let agent = fetcher.pick_user_agent().unwrap();
            assert!(agent == "a" || agent == "b");
        }
    }

    #[test]
    fn test_no_user_agents() {
        let config = HttpConfig {
            user_agents: Vec::new(),
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&config, "probe").unwrap();
        assert!(fetcher.pick_user_agent().is_none());
    }
}
