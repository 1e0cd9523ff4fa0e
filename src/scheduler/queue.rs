//! Priority queue entries.
//!
//! Tasks are type-erased into a [`Job`] so one heap can hold tasks of any
//! output type. The heap pops the highest priority first and, within a
//! priority, the lowest submission sequence.

use std::cmp::Ordering;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use reelfetch_common::{Priority, TaskId};

use super::handle::TaskContext;

/// What the dispatcher does with a dequeued job.
pub(crate) enum Dispatch {
    Run(TaskContext),
    /// Removed before it ran; resolve the handle as cancelled.
    Cancel,
}

/// Execution summary reported back to the scheduler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Completion {
    pub success: bool,
    pub execution: Duration,
    pub retries: u32,
}

pub(crate) type Job = Box<dyn FnOnce(Dispatch) -> Option<BoxFuture<'static, Completion>> + Send>;

pub(crate) struct QueuedTask {
    pub id: TaskId,
    pub priority: Priority,
    pub seq: u64,
    pub submitted: Instant,
    pub cancel: CancellationToken,
    pub job: Job,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn task(priority: Priority, seq: u64) -> QueuedTask {
        QueuedTask {
            id: TaskId::named(format!("{priority}-{seq}")),
            priority,
            seq,
            submitted: Instant::now(),
            cancel: CancellationToken::new(),
            job: Box::new(|_| None),
        }
    }

    #[test]
    fn test_heap_orders_by_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        heap.push(task(Priority::Low, 0));
        heap.push(task(Priority::Normal, 1));
        heap.push(task(Priority::Critical, 2));
        heap.push(task(Priority::Normal, 3));
        heap.push(task(Priority::High, 4));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(
            order,
            vec!["critical-2", "high-4", "normal-1", "normal-3", "low-0"]
        );
    }
}
