use serde::{Deserialize, Serialize};
use std::time::Duration;

use reelfetch_common::EndpointTier;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// TTL applied when a caller does not pass one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// How often the maintenance task sweeps expired entries
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_max_cache_size() -> usize {
    1000
}
fn default_ttl_secs() -> u64 {
    1800
}
fn default_cleanup_interval() -> u64 {
    300
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            default_ttl_secs: default_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Worker count bounds as `[min, max]`
    #[serde(default = "default_concurrency_bounds")]
    pub concurrency_bounds: (usize, usize),

    /// Worker count at startup (clamped into `concurrency_bounds`)
    #[serde(default = "default_initial_workers")]
    pub initial_workers: usize,

    /// Queued + running tasks allowed before submits are rejected
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Resize the pool from observed performance
    #[serde(default = "default_true")]
    pub adaptive: bool,

    /// Minimum time between two adaptation decisions
    #[serde(default = "default_adaptation_interval")]
    pub adaptation_interval_secs: u64,

    /// Samples required before the first adaptation
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Maximum samples kept in the performance window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Only samples completed within this many seconds are considered
    #[serde(default = "default_trailing_window")]
    pub trailing_window_secs: u64,

    /// Overall per-task timeout (0 disables it)
    #[serde(default)]
    pub task_timeout_secs: u64,

    /// How long a graceful shutdown waits for in-flight work
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub thresholds: AdaptationThresholds,
}

/// Thresholds driving grow/shrink decisions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdaptationThresholds {
    /// Grow only when the recent success rate is strictly above this
    #[serde(default = "default_grow_success_rate")]
    pub grow_success_rate: f64,

    /// Grow only when average queue wait is below this
    #[serde(default = "default_grow_max_wait_ms")]
    pub grow_max_wait_ms: u64,

    /// Grow only when average execution time is below this
    #[serde(default = "default_grow_max_exec_ms")]
    pub grow_max_exec_ms: u64,

    /// Shrink when the recent success rate falls below this
    #[serde(default = "default_shrink_success_rate")]
    pub shrink_success_rate: f64,

    /// Shrink when average execution time exceeds this
    #[serde(default = "default_shrink_exec_ms")]
    pub shrink_exec_ms: u64,
}

fn default_concurrency_bounds() -> (usize, usize) {
    (1, 20)
}
fn default_initial_workers() -> usize {
    5
}
fn default_max_queue_size() -> usize {
    1000
}
fn default_true() -> bool {
    true
}
fn default_adaptation_interval() -> u64 {
    60
}
fn default_min_samples() -> usize {
    10
}
fn default_window_size() -> usize {
    50
}
fn default_trailing_window() -> u64 {
    300
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_grow_success_rate() -> f64 {
    0.95
}
fn default_grow_max_wait_ms() -> u64 {
    1000
}
fn default_grow_max_exec_ms() -> u64 {
    5000
}
fn default_shrink_success_rate() -> f64 {
    0.8
}
fn default_shrink_exec_ms() -> u64 {
    10_000
}

impl SchedulerConfig {
    pub fn min_workers(&self) -> usize {
        self.concurrency_bounds.0
    }

    pub fn max_workers(&self) -> usize {
        self.concurrency_bounds.1
    }

    pub fn adaptation_interval(&self) -> Duration {
        Duration::from_secs(self.adaptation_interval_secs)
    }

    pub fn trailing_window(&self) -> Duration {
        Duration::from_secs(self.trailing_window_secs)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_bounds: default_concurrency_bounds(),
            initial_workers: default_initial_workers(),
            max_queue_size: default_max_queue_size(),
            adaptive: true,
            adaptation_interval_secs: default_adaptation_interval(),
            min_samples: default_min_samples(),
            window_size: default_window_size(),
            trailing_window_secs: default_trailing_window(),
            task_timeout_secs: 0,
            shutdown_timeout_secs: default_shutdown_timeout(),
            thresholds: AdaptationThresholds::default(),
        }
    }
}

impl Default for AdaptationThresholds {
    fn default() -> Self {
        Self {
            grow_success_rate: default_grow_success_rate(),
            grow_max_wait_ms: default_grow_max_wait_ms(),
            grow_max_exec_ms: default_grow_max_exec_ms(),
            shrink_success_rate: default_shrink_success_rate(),
            shrink_exec_ms: default_shrink_exec_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Attempts beyond the first (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound on any single retry delay
    #[serde(default = "default_cap")]
    pub cap_ms: u64,

    /// When false every retry waits exactly `base_delay_ms`
    #[serde(default = "default_true")]
    pub exponential: bool,

    /// Jitter as a fraction of the exponential delay, drawn from `[min, max]`
    #[serde(default = "default_jitter")]
    pub jitter: (f64, f64),

    /// Time budget for a single attempt
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_cap() -> u64 {
    30_000
}
fn default_jitter() -> (f64, f64) {
    (0.1, 0.3)
}
fn default_attempt_timeout() -> u64 {
    30
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            backoff_factor: default_backoff_factor(),
            cap_ms: default_cap(),
            exponential: true,
            jitter: default_jitter(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Minimum time between two health checks
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Consecutive failures that mark an endpoint unavailable
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: u32,

    #[serde(default = "default_success_weight")]
    pub success_weight: f64,

    #[serde(default = "default_latency_weight")]
    pub latency_weight: f64,

    /// Average latency at which the latency score reaches zero
    #[serde(default = "default_latency_cutoff")]
    pub latency_cutoff_ms: u64,

    /// Smoothing factor of the latency moving average
    #[serde(default = "default_latency_alpha")]
    pub latency_alpha: f64,

    /// Path requested by liveness probes (it does not need to exist)
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Maximum probes in flight during a health check
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

fn default_health_check_interval() -> u64 {
    3600
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_success_weight() -> f64 {
    0.7
}
fn default_latency_weight() -> f64 {
    0.3
}
fn default_latency_cutoff() -> u64 {
    10_000
}
fn default_latency_alpha() -> f64 {
    0.5
}
fn default_probe_path() -> String {
    "w185/test.jpg".to_string()
}
fn default_probe_concurrency() -> usize {
    10
}

impl HealthConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn latency_cutoff(&self) -> Duration {
        Duration::from_millis(self.latency_cutoff_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
            consecutive_failure_threshold: default_failure_threshold(),
            success_weight: default_success_weight(),
            latency_weight: default_latency_weight(),
            latency_cutoff_ms: default_latency_cutoff(),
            latency_alpha: default_latency_alpha(),
            probe_path: default_probe_path(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Nominal minimum spacing between dispatched requests
    #[serde(default = "default_rate_limit_interval")]
    pub rate_limit_interval_ms: u64,

    #[serde(default = "default_error_multiplier")]
    pub error_multiplier: f64,

    #[serde(default = "default_slow_multiplier")]
    pub slow_multiplier: f64,

    #[serde(default = "default_fast_multiplier")]
    pub fast_multiplier: f64,

    /// Responses slower than this widen the interval
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_ms: u64,

    /// Responses faster than this narrow the interval
    #[serde(default = "default_fast_threshold")]
    pub fast_threshold_ms: u64,
}

fn default_rate_limit_interval() -> u64 {
    200
}
fn default_error_multiplier() -> f64 {
    3.0
}
fn default_slow_multiplier() -> f64 {
    2.0
}
fn default_fast_multiplier() -> f64 {
    0.5
}
fn default_slow_threshold() -> u64 {
    5000
}
fn default_fast_threshold() -> u64 {
    1000
}

impl RateLimitConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_limit_interval_ms: default_rate_limit_interval(),
            error_multiplier: default_error_multiplier(),
            slow_multiplier: default_slow_multiplier(),
            fast_multiplier: default_fast_multiplier(),
            slow_threshold_ms: default_slow_threshold(),
            fast_threshold_ms: default_fast_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_primary")]
    pub primary: Vec<String>,

    #[serde(default = "default_fallback")]
    pub fallback: Vec<String>,

    /// Region-optimised mirrors (empty by default)
    #[serde(default)]
    pub regional: Vec<String>,

    /// Returned by selection when no candidate is available;
    /// defaults to the first primary endpoint
    #[serde(default)]
    pub emergency: Option<String>,
}

fn default_primary() -> Vec<String> {
    vec![
        "https://image.tmdb.org/t/p/".to_string(),
        "https://www.themoviedb.org/t/p/".to_string(),
    ]
}
fn default_fallback() -> Vec<String> {
    vec![
        "https://themoviedb.org/t/p/".to_string(),
        "https://api.themoviedb.org/t/p/".to_string(),
    ]
}

impl EndpointsConfig {
    /// Every configured endpoint with its tier, primaries first.
    pub fn tiered(&self) -> Vec<(String, EndpointTier)> {
        let primary = self.primary.iter().map(|u| (u.clone(), EndpointTier::Primary));
        let fallback = self
            .fallback
            .iter()
            .map(|u| (u.clone(), EndpointTier::Fallback));
        let regional = self
            .regional
            .iter()
            .map(|u| (u.clone(), EndpointTier::Regional));
        primary.chain(fallback).chain(regional).collect()
    }

    /// Default candidate list: primaries followed by fallbacks.
    pub fn candidates(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(self.fallback.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.fallback.is_empty() && self.regional.is_empty()
    }

    /// The endpoint returned when nothing is available.
    pub fn emergency_endpoint(&self) -> Option<String> {
        self.emergency
            .clone()
            .or_else(|| self.primary.first().cloned())
            .or_else(|| self.fallback.first().cloned())
            .or_else(|| self.regional.first().cloned())
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            fallback: default_fallback(),
            regional: Vec::new(),
            emergency: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Idle connections kept per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Rotated per request
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

fn default_http_timeout() -> u64 {
    30
}
fn default_pool_max_idle() -> usize {
    100
}
fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".to_string(),
    ]
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
            user_agents: default_user_agents(),
        }
    }
}
