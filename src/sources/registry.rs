//! Tracks endpoint health and picks the endpoint to send a request to.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use reelfetch_common::{EndpointTier, Error, Result};

use super::health::EndpointHealth;
use crate::config::{EndpointsConfig, HealthConfig};
use crate::fetch::{Fetcher, ProbeOutcome};

/// Hints for [`SourceRegistry::select_best`].
#[derive(Debug, Clone, Default)]
pub struct SelectionPreference {
    /// Endpoints to skip unless they are the only available ones.
    pub avoid: Vec<String>,
    /// Prefer available regional mirrors over every other tier.
    pub prefer_regional: bool,
}

impl SelectionPreference {
    pub fn avoiding(avoid: Vec<String>) -> Self {
        Self {
            avoid,
            prefer_regional: false,
        }
    }
}

/// The endpoint chosen for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub endpoint: String,
    pub score: f64,
    /// No candidate was available; this is the designated emergency fallback.
    pub emergency: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckSummary {
    pub checked: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub restored: Vec<String>,
    pub demoted: Vec<String>,
    pub duration_ms: u64,
}

pub struct SourceRegistry {
    config: HealthConfig,
    emergency: Option<String>,
    endpoints: RwLock<IndexMap<String, EndpointHealth>>,
    last_health_check: Mutex<Option<Instant>>,
}

impl SourceRegistry {
    pub fn new(config: HealthConfig, emergency: Option<String>) -> Self {
        Self {
            config,
            emergency,
            endpoints: RwLock::new(IndexMap::new()),
            last_health_check: Mutex::new(None),
        }
    }

    /// Build a registry tracking every configured endpoint.
    pub fn from_config(health: HealthConfig, endpoints: &EndpointsConfig) -> Self {
        let registry = Self::new(health, endpoints.emergency_endpoint());
        for (url, tier) in endpoints.tiered() {
            registry.register(url, tier);
        }
        registry
    }

    /// Start tracking an endpoint. Re-registering keeps existing stats and
    /// updates the tier.
    pub fn register(&self, url: impl Into<String>, tier: EndpointTier) {
        let url = url.into();
        let mut endpoints = self.endpoints.write();
        endpoints
            .entry(url.clone())
            .and_modify(|h| h.tier = tier)
            .or_insert_with(|| EndpointHealth::new(url, tier));
    }

    fn ensure_tracked(&self, candidates: &[String]) {
        let missing: Vec<&String> = {
            let endpoints = self.endpoints.read();
            candidates
                .iter()
                .filter(|c| !endpoints.contains_key(c.as_str()))
                .collect()
        };
        if missing.is_empty() {
            return;
        }
        let mut endpoints = self.endpoints.write();
        for url in missing {
            endpoints
                .entry(url.clone())
                .or_insert_with(|| EndpointHealth::new(url.clone(), EndpointTier::Primary));
        }
    }

    /// Pick the highest-scoring available candidate.
    ///
    /// Avoided endpoints are used only when nothing else is available. When no
    /// candidate is available the emergency endpoint (or the first candidate)
    /// is returned with `emergency` set. Ties go to the earlier candidate.
    pub fn select_best(
        &self,
        candidates: &[String],
        preference: &SelectionPreference,
    ) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(Error::NoEndpoints);
        }
        self.ensure_tracked(candidates);

        let endpoints = self.endpoints.read();
        let available: Vec<&EndpointHealth> = candidates
            .iter()
            .filter_map(|c| endpoints.get(c.as_str()))
            .filter(|h| h.available)
            .collect();

        let mut pool: Vec<&EndpointHealth> = available
            .iter()
            .copied()
            .filter(|h| !preference.avoid.contains(&h.url))
            .collect();
        if pool.is_empty() {
            pool = available;
        }
        if preference.prefer_regional {
            let regional: Vec<&EndpointHealth> = pool
                .iter()
                .copied()
                .filter(|h| h.tier == EndpointTier::Regional)
                .collect();
            if !regional.is_empty() {
                pool = regional;
            }
        }

        let mut best: Option<(&EndpointHealth, f64)> = None;
        for health in pool {
            let score = health.score(&self.config);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((health, score));
            }
        }

        match best {
            Some((health, score)) => {
                debug!(endpoint = %health.url, score, "Selected endpoint");
                Ok(Selection {
                    endpoint: health.url.clone(),
                    score,
                    emergency: false,
                })
            }
            None => {
                let endpoint = self
                    .emergency
                    .clone()
                    .unwrap_or_else(|| candidates[0].clone());
                warn!(
                    endpoint = %endpoint,
                    candidates = candidates.len(),
                    "No available endpoint, using emergency fallback"
                );
                Ok(Selection {
                    endpoint,
                    score: 0.0,
                    emergency: true,
                })
            }
        }
    }

    /// Record a successful real request.
    pub fn record_success(&self, url: &str, latency: Duration) {
        let alpha = self.config.latency_alpha;
        let restored = self.with_endpoint(url, |h| h.record_success(latency, alpha));
        if restored {
            info!(endpoint = %url, "Endpoint available again after successful request");
        }
    }

    /// Record a failed real request.
    pub fn record_failure(&self, url: &str, error: &Error) {
        let threshold = self.config.consecutive_failure_threshold;
        let demoted = self.with_endpoint(url, |h| h.record_failure(error.to_string(), threshold));
        if demoted {
            warn!(
                endpoint = %url,
                threshold,
                error = %error,
                "Endpoint marked unavailable"
            );
        }
    }

    fn record_probe(&self, url: &str, outcome: &ProbeOutcome) -> bool {
        let alpha = self.config.latency_alpha;
        let threshold = self.config.consecutive_failure_threshold;
        self.with_endpoint(url, |h| match outcome {
            ProbeOutcome::Reachable { latency, .. } => h.record_probe_success(*latency, alpha),
            ProbeOutcome::Unreachable { reason } => h.record_probe_failure(reason.clone(), threshold),
        })
    }

    fn with_endpoint<R>(&self, url: &str, f: impl FnOnce(&mut EndpointHealth) -> R) -> R {
        let mut endpoints = self.endpoints.write();
        let health = endpoints
            .entry(url.to_string())
            .or_insert_with(|| EndpointHealth::new(url, EndpointTier::Primary));
        f(health)
    }

    /// Run a health check unless one ran within the configured interval.
    pub async fn check_health_if_due(&self, fetcher: &dyn Fetcher) -> Option<HealthCheckSummary> {
        {
            let mut last = self.last_health_check.lock();
            let now = Instant::now();
            if let Some(at) = *last {
                if now.duration_since(at) < self.config.health_check_interval() {
                    return None;
                }
            }
            *last = Some(now);
        }
        Some(self.run_health_check(fetcher).await)
    }

    /// Probe every tracked endpoint now.
    pub async fn force_health_check(&self, fetcher: &dyn Fetcher) -> HealthCheckSummary {
        *self.last_health_check.lock() = Some(Instant::now());
        self.run_health_check(fetcher).await
    }

    async fn run_health_check(&self, fetcher: &dyn Fetcher) -> HealthCheckSummary {
        let started = Instant::now();
        let urls: Vec<String> = self.endpoints.read().keys().cloned().collect();
        let timeout = self.config.probe_timeout();

        let outcomes: Vec<(String, ProbeOutcome)> = stream::iter(urls)
            .map(|url| async move {
                let outcome = fetcher.probe(&url, timeout).await;
                (url, outcome)
            })
            .buffer_unordered(self.config.probe_concurrency)
            .collect()
            .await;

        let mut summary = HealthCheckSummary {
            checked: outcomes.len(),
            reachable: 0,
            unreachable: 0,
            restored: Vec::new(),
            demoted: Vec::new(),
            duration_ms: 0,
        };

        for (url, outcome) in &outcomes {
            let changed = self.record_probe(url, outcome);
            if outcome.is_reachable() {
                summary.reachable += 1;
                if changed {
                    summary.restored.push(url.clone());
                }
            } else {
                summary.unreachable += 1;
                if changed {
                    summary.demoted.push(url.clone());
                }
                debug!(endpoint = %url, outcome = ?outcome, "Probe failed");
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            checked = summary.checked,
            reachable = summary.reachable,
            unreachable = summary.unreachable,
            duration_ms = summary.duration_ms,
            "Endpoint health check complete"
        );
        summary
    }

    pub fn is_available(&self, url: &str) -> bool {
        self.endpoints
            .read()
            .get(url)
            .map(|h| h.available)
            .unwrap_or(false)
    }

    pub fn get(&self, url: &str) -> Option<EndpointHealth> {
        let endpoints = self.endpoints.read();
        endpoints.get(url).map(|h| self.snapshot(h))
    }

    /// Per-endpoint health in registration order.
    pub fn report(&self) -> Vec<EndpointHealth> {
        let endpoints = self.endpoints.read();
        endpoints.values().map(|h| self.snapshot(h)).collect()
    }

    pub fn available_count(&self) -> usize {
        self.endpoints.read().values().filter(|h| h.available).count()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    fn snapshot(&self, health: &EndpointHealth) -> EndpointHealth {
        let mut snapshot = health.clone();
        snapshot.health_score = health.score(&self.config);
        snapshot
    }
}
