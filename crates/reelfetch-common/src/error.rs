//! Error taxonomy shared by every reelfetch component.
//!
//! Failures are split by what the caller can do about them: transient network
//! errors and timeouts are retried, permanent rejections abort the attempt loop,
//! `QueueFull` is a synchronous backpressure signal, and `AllEndpointsExhausted`
//! carries the full per-endpoint history once the retry budget is spent.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// One failed attempt recorded by the retry executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptFailure {
    /// Zero-based attempt number.
    pub attempt: u32,
    /// Endpoint the attempt was sent to.
    pub endpoint: String,
    /// Rendered cause of the failure.
    pub cause: String,
    /// Whether the failure was classified as retryable.
    pub retryable: bool,
}

/// Structured description of a request that ran out of attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureReport {
    /// Distinct endpoints tried, in first-attempt order.
    pub endpoints_tried: Vec<String>,
    /// Total attempts made (never more than `max_retries + 1`).
    pub attempts: u32,
    /// Every failed attempt, oldest first.
    pub history: Vec<AttemptFailure>,
}

impl FailureReport {
    /// Record a failed attempt.
    pub fn push(&mut self, failure: AttemptFailure) {
        if !self.endpoints_tried.contains(&failure.endpoint) {
            self.endpoints_tried.push(failure.endpoint.clone());
        }
        self.attempts = self.attempts.max(failure.attempt + 1);
        self.history.push(failure);
    }

    /// The most recent failure, if any attempt was made.
    pub fn last_cause(&self) -> Option<&AttemptFailure> {
        self.history.last()
    }

    /// Number of retries performed (attempts beyond the first).
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Failures grouped by endpoint, preserving first-attempt order.
    pub fn by_endpoint(&self) -> Vec<(&str, Vec<&AttemptFailure>)> {
        self.endpoints_tried
            .iter()
            .map(|endpoint| {
                let failures = self
                    .history
                    .iter()
                    .filter(|f| &f.endpoint == endpoint)
                    .collect();
                (endpoint.as_str(), failures)
            })
            .collect()
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempt(s) across [{}]",
            self.attempts,
            self.endpoints_tried.join(", ")
        )?;
        if let Some(last) = self.last_cause() {
            write!(f, "; last cause: {}", last.cause)?;
        }
        Ok(())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Common error type for reelfetch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A network-level failure that may succeed on a later attempt
    /// (connection reset, 5xx, 429).
    #[error("Transient network error [{endpoint}]: {message}")]
    Transient {
        /// Endpoint the request was sent to.
        endpoint: String,
        /// Human-readable cause.
        message: String,
    },

    /// The origin permanently rejected the request (400/401/403/404 and other
    /// client-side rejections). Never retried.
    #[error("Permanent request error [{endpoint}]{}: {message}", status_suffix(.status))]
    Permanent {
        /// Endpoint the request was sent to.
        endpoint: String,
        /// HTTP status, when the rejection came from a response.
        status: Option<u16>,
        /// Human-readable cause.
        message: String,
        /// Earlier retryable attempts of the same request, when the rejection
        /// came after one or more retries.
        report: Option<Box<FailureReport>>,
    },

    /// The scheduler rejected a submission because it is at capacity.
    #[error("Task queue full (max: {capacity})")]
    QueueFull {
        /// Configured `max_queue_size`.
        capacity: usize,
    },

    /// An attempt or task exceeded its time budget.
    #[error("Timed out after {}ms [{endpoint}]", .elapsed.as_millis())]
    Timeout {
        /// Endpoint (or task id) that timed out.
        endpoint: String,
        /// Budget that was exceeded.
        elapsed: Duration,
    },

    /// Every attempt in the retry budget failed.
    #[error("All endpoints exhausted: {0}")]
    AllEndpointsExhausted(Box<FailureReport>),

    /// The task was cancelled before it produced a result.
    #[error("Cancelled")]
    Cancelled,

    /// The engine is shutting down and no longer accepts work.
    #[error("Shutting down")]
    ShuttingDown,

    /// No endpoint candidates were supplied or configured.
    #[error("No endpoints configured")]
    NoEndpoints,

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new Transient error.
    pub fn transient<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        Self::Transient {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a new Permanent error.
    pub fn permanent<E: Into<String>, M: Into<String>>(
        endpoint: E,
        status: Option<u16>,
        message: M,
    ) -> Self {
        Self::Permanent {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
            report: None,
        }
    }

    /// Attach the attempt history of the request this error ended.
    ///
    /// Only permanent rejections carry a report this way; other errors are
    /// returned unchanged.
    pub fn with_report(self, history: FailureReport) -> Self {
        match self {
            Self::Permanent {
                endpoint,
                status,
                message,
                ..
            } => Self::Permanent {
                endpoint,
                status,
                message,
                report: Some(Box::new(history)),
            },
            other => other,
        }
    }

    /// Create a new Timeout error.
    pub fn timeout<E: Into<String>>(endpoint: E, elapsed: Duration) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
            elapsed,
        }
    }

    /// Create a new InvalidConfig error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether another attempt could succeed.
    ///
    /// Transient failures and timeouts are retryable; everything else aborts
    /// the attempt loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// The endpoint this error is attributed to, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Transient { endpoint, .. }
            | Self::Permanent { endpoint, .. }
            | Self::Timeout { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// The failure report, for exhausted requests and for permanent
    /// rejections that followed retries.
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::AllEndpointsExhausted(report) => Some(report),
            Self::Permanent {
                report: Some(report),
                ..
            } => Some(report),
            _ => None,
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
