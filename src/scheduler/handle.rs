use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use reelfetch_common::{Error, Priority, Result, TaskId, TaskState};

/// Handed to a task when it starts running.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    priority: Priority,
    cancel: CancellationToken,
    retries: Arc<AtomicU32>,
    wait: Duration,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        priority: Priority,
        cancel: CancellationToken,
        wait: Duration,
    ) -> Self {
        Self {
            id,
            priority,
            cancel,
            retries: Arc::new(AtomicU32::new(0)),
            wait,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Signalled by `cancel_all`. Cooperative: the task decides when to stop.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time spent queued before dispatch.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Report how many retries the operation needed.
    pub fn record_retries(&self, retries: u32) {
        self.retries.store(retries, Ordering::Relaxed);
    }

    /// Retries reported so far.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    pub(crate) fn retry_counter(&self) -> Arc<AtomicU32> {
        self.retries.clone()
    }
}

/// Terminal result of a task.
#[derive(Debug)]
pub struct TaskResult<T> {
    pub task_id: TaskId,
    pub priority: Priority,
    pub outcome: Result<T>,
    pub wait: Duration,
    pub execution: Duration,
    pub retries: u32,
}

impl<T> TaskResult<T> {
    pub(crate) fn cancelled(task_id: TaskId, priority: Priority) -> Self {
        Self {
            task_id,
            priority,
            outcome: Err(Error::Cancelled),
            wait: Duration::ZERO,
            execution: Duration::ZERO,
            retries: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn state(&self) -> TaskState {
        match &self.outcome {
            Ok(_) => TaskState::Completed,
            Err(Error::Cancelled) => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        }
    }

    /// Unwrap the outcome.
    pub fn into_result(self) -> Result<T> {
        self.outcome
    }
}

/// Handle to a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    priority: Priority,
    cancel: CancellationToken,
    rx: oneshot::Receiver<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        id: TaskId,
        priority: Priority,
        cancel: CancellationToken,
        rx: oneshot::Receiver<TaskResult<T>>,
    ) -> Self {
        Self {
            id,
            priority,
            cancel,
            rx,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Signal the task's cancellation token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to finish.
    pub async fn join(self) -> TaskResult<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => TaskResult {
                task_id: self.id.clone(),
                priority: self.priority,
                outcome: Err(Error::internal(format!(
                    "task {} terminated without a result",
                    self.id
                ))),
                wait: Duration::ZERO,
                execution: Duration::ZERO,
                retries: 0,
            },
        }
    }
}
