//! Adaptive request spacing.
//!
//! The limiter hands out dispatch slots at least the configured interval
//! apart. A caller reserves its slot under the lock and then sleeps outside
//! it, so a waiting caller never blocks anyone else. The adaptive interval
//! widens slot spacing after errors and slow responses; after fast responses
//! it only shortens [`AdaptiveRateLimiter::pause_after`], never the spacing.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

/// What happened to a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// A response arrived after `latency`.
    Success(Duration),
    /// The request failed.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimiterStats {
    pub acquisitions: u64,
    pub total_waited_ms: u64,
    pub current_interval_ms: u64,
    pub nominal_interval_ms: u64,
}

struct LimiterState {
    last_slot: Option<Instant>,
    interval: Duration,
    acquisitions: u64,
    total_waited: Duration,
}

pub struct AdaptiveRateLimiter {
    config: RateLimitConfig,
    nominal: Duration,
    state: Mutex<LimiterState>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let nominal = config.interval();
        Self {
            config,
            nominal,
            state: Mutex::new(LimiterState {
                last_slot: None,
                interval: nominal,
                acquisitions: 0,
                total_waited: Duration::ZERO,
            }),
        }
    }

    /// Wait until this caller may dispatch.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let (slot, wait) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let slot = match state.last_slot {
                Some(last) => (last + state.interval.max(self.nominal)).max(now),
                None => now,
            };
            state.last_slot = Some(slot);
            state.acquisitions += 1;
            let wait = slot.saturating_duration_since(now);
            state.total_waited += wait;
            (slot, wait)
        };

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter delaying dispatch");
            sleep_until(slot).await;
        }
        wait
    }

    /// The interval that would follow `outcome`.
    pub fn delay_for(&self, outcome: ResponseOutcome) -> Duration {
        let c = &self.config;
        let multiplier = match outcome {
            ResponseOutcome::Error => c.error_multiplier,
            ResponseOutcome::Success(latency) => {
                let ms = latency.as_millis() as u64;
                if ms > c.slow_threshold_ms {
                    c.slow_multiplier
                } else if ms < c.fast_threshold_ms {
                    c.fast_multiplier
                } else {
                    1.0
                }
            }
        };
        self.nominal.mul_f64(multiplier)
    }

    /// Adjust the interval for subsequent acquisitions.
    pub fn observe(&self, outcome: ResponseOutcome) {
        let interval = self.delay_for(outcome);
        let mut state = self.state.lock();
        if state.interval != interval {
            debug!(
                from_ms = state.interval.as_millis() as u64,
                to_ms = interval.as_millis() as u64,
                "Rate limiter interval adjusted"
            );
        }
        state.interval = interval;
    }

    /// Record `outcome` and sleep for the resulting delay.
    pub async fn pause_after(&self, outcome: ResponseOutcome) {
        self.observe(outcome);
        tokio::time::sleep(self.current_interval()).await;
    }

    pub fn current_interval(&self) -> Duration {
        self.state.lock().interval
    }

    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock();
        RateLimiterStats {
            acquisitions: state.acquisitions,
            total_waited_ms: state.total_waited.as_millis() as u64,
            current_interval_ms: state.interval.as_millis() as u64,
            nominal_interval_ms: self.nominal.as_millis() as u64,
        }
    }
}
