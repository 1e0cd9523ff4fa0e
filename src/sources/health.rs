use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use reelfetch_common::EndpointTier;

use crate::config::HealthConfig;

/// Health record for one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub url: String,
    pub tier: EndpointTier,
    /// Exponential moving average over request and probe latencies.
    pub avg_latency_ms: Option<f64>,
    pub success_count: u64,
    pub failure_count: u64,
    pub probe_success_count: u64,
    pub probe_failure_count: u64,
    pub consecutive_failures: u32,
    pub available: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Score at the time of the snapshot; filled in by the registry.
    pub health_score: f64,
}

impl EndpointHealth {
    pub fn new(url: impl Into<String>, tier: EndpointTier) -> Self {
        Self {
            url: url.into(),
            tier,
            avg_latency_ms: None,
            success_count: 0,
            failure_count: 0,
            probe_success_count: 0,
            probe_failure_count: 0,
            consecutive_failures: 0,
            available: true,
            last_checked: None,
            last_error: None,
            health_score: 1.0,
        }
    }

    /// Share of real requests that succeeded; 1.0 before any request.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    /// `w_success * success_rate + w_latency * latency_score`, or 0 when
    /// unavailable.
    pub fn score(&self, config: &HealthConfig) -> f64 {
        if !self.available {
            return 0.0;
        }
        let latency_score = match self.avg_latency_ms {
            Some(avg) => (1.0 - avg / config.latency_cutoff_ms as f64).max(0.0),
            None => 1.0,
        };
        config.success_weight * self.success_rate() + config.latency_weight * latency_score
    }

    fn observe_latency(&mut self, latency: Duration, alpha: f64) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.avg_latency_ms = Some(match self.avg_latency_ms {
            Some(avg) => alpha * sample + (1.0 - alpha) * avg,
            None => sample,
        });
    }

    /// Returns `true` when this success brought the endpoint back.
    pub(crate) fn record_success(&mut self, latency: Duration, alpha: f64) -> bool {
        self.observe_latency(latency, alpha);
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.last_checked = Some(Utc::now());
        !std::mem::replace(&mut self.available, true)
    }

    /// Returns `true` when this failure took the endpoint down.
    pub(crate) fn record_failure(&mut self, cause: String, threshold: u32) -> bool {
        self.failure_count += 1;
        self.register_consecutive_failure(cause, threshold)
    }

    /// Returns `true` when the probe brought the endpoint back.
    pub(crate) fn record_probe_success(&mut self, latency: Duration, alpha: f64) -> bool {
        self.observe_latency(latency, alpha);
        self.probe_success_count += 1;
        self.consecutive_failures = 0;
        self.last_checked = Some(Utc::now());
        !std::mem::replace(&mut self.available, true)
    }

    /// Returns `true` when the probe failure took the endpoint down.
    pub(crate) fn record_probe_failure(&mut self, reason: String, threshold: u32) -> bool {
        self.probe_failure_count += 1;
        self.register_consecutive_failure(reason, threshold)
    }

    fn register_consecutive_failure(&mut self, cause: String, threshold: u32) -> bool {
        self.consecutive_failures += 1;
        self.last_checked = Some(Utc::now());
        self.last_error = Some(cause);
        if self.available && self.consecutive_failures >= threshold {
            self.available = false;
            return true;
        }
        false
    }
}
