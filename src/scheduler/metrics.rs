//! Performance window and worker-count adaptation.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use reelfetch_common::{Priority, TaskId, TaskState};

use crate::config::AdaptationThresholds;

/// Records kept before the history is trimmed.
pub(crate) const HISTORY_CAP: usize = 1000;
/// Records kept after trimming.
pub(crate) const HISTORY_KEEP: usize = 500;
/// Records averaged for the execution/wait figures in stats.
pub(crate) const STATS_RECENT: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    wait: Duration,
    execution: Duration,
    success: bool,
}

/// Aggregates over the samples inside the trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub samples: usize,
    pub success_rate: f64,
    pub avg_wait: Duration,
    pub avg_execution: Duration,
}

/// Bounded, time-ordered sample buffer.
#[derive(Debug)]
pub(crate) struct PerformanceWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl PerformanceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, at: Instant, wait: Duration, execution: Duration, success: bool) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            at,
            wait,
            execution,
            success,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Summarise samples no older than `window` at `now`.
    pub fn summary(&self, now: Instant, window: Duration) -> Option<WindowSummary> {
        let recent: Vec<&Sample> = self
            .samples
            .iter()
            .filter(|s| now.saturating_duration_since(s.at) <= window)
            .collect();
        if recent.is_empty() {
            return None;
        }

        let n = recent.len() as u32;
        let successes = recent.iter().filter(|s| s.success).count();
        let total_wait: Duration = recent.iter().map(|s| s.wait).sum();
        let total_exec: Duration = recent.iter().map(|s| s.execution).sum();

        Some(WindowSummary {
            samples: recent.len(),
            success_rate: successes as f64 / recent.len() as f64,
            avg_wait: total_wait / n,
            avg_execution: total_exec / n,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adaptation {
    Grow,
    Shrink,
    Hold,
}

/// Decide whether the worker pool should change size.
pub fn decide(summary: &WindowSummary, thresholds: &AdaptationThresholds) -> Adaptation {
    let wait_ms = summary.avg_wait.as_millis() as u64;
    let exec_ms = summary.avg_execution.as_millis() as u64;

    if summary.success_rate > thresholds.grow_success_rate
        && wait_ms < thresholds.grow_max_wait_ms
        && exec_ms < thresholds.grow_max_exec_ms
    {
        Adaptation::Grow
    } else if summary.success_rate < thresholds.shrink_success_rate
        || exec_ms > thresholds.shrink_exec_ms
    {
        Adaptation::Shrink
    } else {
        Adaptation::Hold
    }
}

/// Finished task, as kept in the scheduler history.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub priority: Priority,
    pub state: TaskState,
    pub wait_ms: u64,
    pub execution_ms: u64,
    pub retries: u32,
    pub finished_at: DateTime<Utc>,
}

/// Append a record, trimming to the newest [`HISTORY_KEEP`] once the history
/// reaches [`HISTORY_CAP`].
pub(crate) fn push_history(history: &mut VecDeque<TaskRecord>, record: TaskRecord) {
    history.push_back(record);
    if history.len() >= HISTORY_CAP {
        let excess = history.len() - HISTORY_KEEP;
        history.drain(..excess);
    }
}

/// Scheduler statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub cancelled: u64,
    /// `completed / (completed + failed)`, 0.0 before any task finished.
    pub success_rate: f64,
    pub active: usize,
    pub queued: usize,
    pub worker_limit: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub peak_concurrency: usize,
    /// Average over the newest finished tasks.
    pub avg_execution_ms: f64,
    pub avg_wait_ms: f64,
    pub queue_utilization: f64,
    pub pool_utilization: f64,
    pub window_samples: usize,
}

/// Average execution and wait over the newest [`STATS_RECENT`] records.
pub(crate) fn recent_averages(history: &VecDeque<TaskRecord>) -> (f64, f64) {
    let recent: Vec<&TaskRecord> = history.iter().rev().take(STATS_RECENT).collect();
    if recent.is_empty() {
        return (0.0, 0.0);
    }
    let n = recent.len() as f64;
    let exec = recent.iter().map(|r| r.execution_ms as f64).sum::<f64>() / n;
    let wait = recent.iter().map(|r| r.wait_ms as f64).sum::<f64>() / n;
    (exec, wait)
}
