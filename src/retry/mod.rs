//! Retrying execution across endpoints.
//!
//! Each attempt takes a rate-limiter slot, asks the registry for the best
//! endpoint (steering away from endpoints that already failed this request)
//! and runs the operation under a per-attempt timeout. Outcomes are fed back
//! to both the registry and the limiter. Permanent failures end the loop at
//! once, carrying the history of any earlier attempts; everything else is retried with capped, jittered exponential backoff
//! until `max_retries + 1` attempts have been made.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reelfetch_common::{AttemptFailure, Error, FailureReport, Result};

use crate::config::RetryPolicy;
use crate::rate_limit::{AdaptiveRateLimiter, ResponseOutcome};
use crate::sources::{SelectionPreference, SourceRegistry};

/// Passed to the operation on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Zero-based attempt number.
    pub number: u32,
    /// Endpoint selected for this attempt.
    pub endpoint: String,
}

/// A successful execution.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    pub endpoint: String,
}

impl<T> RetryOutcome<T> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Delay before the retry following attempt `attempt`.
///
/// `min(base * factor^attempt + jitter, cap)` where jitter is a random
/// fraction (drawn from `policy.jitter`) of the exponential term. With
/// `exponential` off every retry waits `base_delay`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let cap = policy.cap();
    if !policy.exponential {
        return policy.base_delay().min(cap);
    }

    let exp = policy.base_delay().as_secs_f64() * policy.backoff_factor.powi(attempt as i32);
    let (lo, hi) = policy.jitter;
    let fraction = if hi > lo {
        rand::thread_rng().gen_range(lo..=hi)
    } else {
        lo
    };
    let total = (exp + exp * fraction).min(cap.as_secs_f64());
    Duration::from_secs_f64(total.max(0.0))
}

#[derive(Clone)]
pub struct RetryExecutor {
    registry: Arc<SourceRegistry>,
    limiter: Arc<AdaptiveRateLimiter>,
    prefer_regional: bool,
}

impl RetryExecutor {
    pub fn new(registry: Arc<SourceRegistry>, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        Self {
            registry,
            limiter,
            prefer_regional: false,
        }
    }

    /// Prefer regional mirrors when selecting endpoints.
    pub fn prefer_regional(mut self, prefer: bool) -> Self {
        self.prefer_regional = prefer;
        self
    }

    /// Run `op` until it succeeds, fails permanently, is cancelled, or the
    /// attempt budget is spent.
    pub async fn execute<T, F, Fut>(
        &self,
        candidates: &[String],
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if candidates.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let mut report = FailureReport::default();
        let attempt_timeout = policy.attempt_timeout();

        for number in 0..=policy.max_retries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.limiter.acquire() => {}
            }

            let avoid = if candidates.len() > 1 {
                report.endpoints_tried.clone()
            } else {
                Vec::new()
            };
            let selection = self.registry.select_best(
                candidates,
                &SelectionPreference {
                    avoid,
                    prefer_regional: self.prefer_regional,
                },
            )?;
            let endpoint = selection.endpoint;

            debug!(attempt = number, endpoint = %endpoint, "Dispatching attempt");

            let started = Instant::now();
            let attempt = Attempt {
                number,
                endpoint: endpoint.clone(),
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = tokio::time::timeout(attempt_timeout, op(attempt)) => r,
            };
            let result = result.unwrap_or_else(|_| Err(Error::timeout(&endpoint, attempt_timeout)));
            let latency = started.elapsed();

            let err = match result {
                Ok(value) => {
                    self.registry.record_success(&endpoint, latency);
                    self.limiter.observe(ResponseOutcome::Success(latency));
                    return Ok(RetryOutcome {
                        value,
                        attempts: number + 1,
                        endpoint,
                    });
                }
                Err(err) => err,
            };

            self.registry.record_failure(&endpoint, &err);
            self.limiter.observe(ResponseOutcome::Error);

            let retryable = err.is_retryable();
            if !retryable {
                warn!(
                    attempt = number,
                    endpoint = %endpoint,
                    error = %err,
                    "Non-retryable failure, giving up"
                );
                if report.history.is_empty() {
                    return Err(err);
                }
                report.push(AttemptFailure {
                    attempt: number,
                    endpoint,
                    cause: err.to_string(),
                    retryable,
                });
                return Err(err.with_report(report));
            }

            report.push(AttemptFailure {
                attempt: number,
                endpoint: endpoint.clone(),
                cause: err.to_string(),
                retryable,
            });

            if number < policy.max_retries {
                let delay = backoff_delay(policy, number);
                warn!(
                    attempt = number,
                    endpoint = %endpoint,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(
            attempts = report.attempts,
            endpoints = ?report.endpoints_tried,
            "All attempts failed"
        );
        Err(Error::AllEndpointsExhausted(Box::new(report)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthConfig, RateLimitConfig};
    use assert_matches::assert_matches;
    use reelfetch_common::EndpointTier;
    use std::sync::atomic::{AtomicU32, Ordering};

    const A: &str = "https://a.example/";
    const B: &str = "https://b.example/";

    fn executor() -> (RetryExecutor, Arc<SourceRegistry>) {
        let registry = Arc::new(SourceRegistry::new(HealthConfig::default(), None));
        registry.register(A, EndpointTier::Primary);
        registry.register(B, EndpointTier::Fallback);
        let limiter = Arc::new(AdaptiveRateLimiter::new(RateLimitConfig::default()));
        (RetryExecutor::new(registry.clone(), limiter), registry)
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            cap_ms: 5000,
            jitter: (0.0, 0.0),
            ..Default::default()
        };
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_jitter_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = backoff_delay(&policy, 1);
            assert!(delay >= Duration::from_millis(2200));
            assert!(delay <= Duration::from_millis(2600));
        }
    }

    #[test]
    fn test_constant_backoff() {
        let policy = RetryPolicy {
            exponential: false,
            ..Default::default()
        };
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&policy, 5), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_use_full_budget() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let result: Result<RetryOutcome<()>> = executor
            .execute(&[A.to_string()], &policy(3), &CancellationToken::new(), |a| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(Error::transient(a.endpoint, "503")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let err = result.unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.attempts, 4);
        assert_eq!(report.endpoints_tried, vec![A.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_single_attempt() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let result: Result<RetryOutcome<()>> = executor
            .execute(
                &[A.to_string(), B.to_string()],
                &policy(3),
                &CancellationToken::new(),
                |a| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(Error::permanent(a.endpoint, Some(404), "not found")) }
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_matches!(result, Err(Error::Permanent { status: Some(404), .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_after_retry_keeps_history() {
        let (executor, _) = executor();

        let result: Result<RetryOutcome<()>> = executor
            .execute(
                &[A.to_string(), B.to_string()],
                &policy(3),
                &CancellationToken::new(),
                |a| async move {
                    if a.number == 0 {
                        Err(Error::transient(a.endpoint, "connection reset"))
                    } else {
                        Err(Error::permanent(a.endpoint, Some(404), "not found"))
                    }
                },
            )
            .await;

        let err = result.unwrap_err();
        assert_matches!(err, Error::Permanent { status: Some(404), .. });
        let report = err.report().unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.retries(), 1);
        assert_eq!(report.endpoints_tried, vec![A.to_string(), B.to_string()]);
        assert!(report.history[0].retryable);
        assert!(!report.last_cause().unwrap().retryable);
        assert!(report.last_cause().unwrap().cause.contains("404"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_over_to_second_endpoint() {
        let (executor, registry) = executor();

        let outcome = executor
            .execute(
                &[A.to_string(), B.to_string()],
                &policy(3),
                &CancellationToken::new(),
                |a| async move {
                    if a.endpoint == A {
                        Err(Error::transient(a.endpoint, "connection reset"))
                    } else {
                        Ok("poster")
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.value, "poster");
        assert_eq!(outcome.endpoint, B);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.retries(), 1);

        let a = registry.get(A).unwrap();
        assert_eq!(a.failure_count, 1);
        assert_eq!(a.consecutive_failures, 1);
        assert_eq!(registry.get(B).unwrap().success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable() {
        let (executor, _) = executor();
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay_ms: 10,
            attempt_timeout_secs: 1,
            ..Default::default()
        };

        let result: Result<RetryOutcome<()>> = executor
            .execute(&[A.to_string()], &policy, &CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.attempts, 2);
        assert!(report.history.iter().all(|f| f.cause.contains("Timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retry_loop() {
        let (executor, _) = executor();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<RetryOutcome<()>> = executor
            .execute(&[A.to_string()], &policy(5), &cancel, |a| {
                calls.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                async move { Err(Error::transient(a.endpoint, "reset")) }
            })
            .await;

        assert_matches!(result, Err(Error::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let (executor, _) = executor();
        let result: Result<RetryOutcome<()>> = executor
            .execute(&[], &policy(1), &CancellationToken::new(), |_| async { Ok(()) })
            .await;
        assert_matches!(result, Err(Error::NoEndpoints));
    }
}
