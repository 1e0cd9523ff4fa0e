//! Adaptive priority scheduler.
//!
//! Submitted tasks wait in a priority queue and are spawned onto the tokio
//! runtime while fewer than `worker_limit` are running. Dispatch is event
//! driven: every submit and every completion pumps the queue. The worker limit
//! moves within the configured bounds based on recent success rate, queue wait
//! and execution time. Running tasks are never preempted.

mod handle;
mod metrics;
mod queue;

pub use handle::{TaskContext, TaskHandle, TaskResult};
pub use metrics::{decide, Adaptation, SchedulerStats, TaskRecord, WindowSummary};

use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reelfetch_common::{Error, Priority, Result, TaskId, TaskState};

use crate::config::SchedulerConfig;
use metrics::{push_history, recent_averages, PerformanceWindow};
use queue::{Completion, Dispatch, Job, QueuedTask};

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    submitted: u64,
    completed: u64,
    failed: u64,
    rejected: u64,
    cancelled: u64,
}

struct SchedulerState {
    queue: BinaryHeap<QueuedTask>,
    running: usize,
    worker_limit: usize,
    peak_concurrency: usize,
    next_seq: u64,
    next_batch: u64,
    accepting: bool,
    window: PerformanceWindow,
    last_adaptation: Instant,
    totals: Totals,
    history: VecDeque<TaskRecord>,
}

impl SchedulerState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running == 0
    }
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    idle: Notify,
    /// Tokens of running tasks, keyed by queue sequence number since caller
    /// ids need not be unique.
    running_tokens: DashMap<u64, CancellationToken>,
}

/// Cloneable handle to a shared scheduler.
#[derive(Clone)]
pub struct AdaptiveScheduler {
    inner: Arc<Inner>,
}

impl AdaptiveScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let worker_limit = config
            .initial_workers
            .clamp(config.min_workers(), config.max_workers().max(config.min_workers()));

        let state = SchedulerState {
            queue: BinaryHeap::new(),
            running: 0,
            worker_limit,
            peak_concurrency: 0,
            next_seq: 0,
            next_batch: 0,
            accepting: true,
            window: PerformanceWindow::new(config.window_size),
            last_adaptation: Instant::now(),
            totals: Totals::default(),
            history: VecDeque::new(),
        };

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                idle: Notify::new(),
                running_tokens: DashMap::new(),
            }),
        }
    }

    /// Queue an operation.
    ///
    /// Fails immediately with [`Error::QueueFull`] when queued plus running
    /// tasks already reach `max_queue_size`, and with [`Error::ShuttingDown`]
    /// after [`close`](Self::close). Must be called from within a tokio
    /// runtime.
    pub fn submit<T, F, Fut>(
        &self,
        priority: Priority,
        id: Option<TaskId>,
        op: F,
    ) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = id.unwrap_or_default();
        let (task, handle) = self.prepare(id, priority, op);
        self.enqueue(vec![task])?;
        Ok(handle)
    }

    /// Queue several operations, all or none.
    ///
    /// Tasks are named `batch-<n>-<i>`. If the whole batch does not fit, none
    /// of it is queued.
    pub fn submit_batch<T, F, Fut>(
        &self,
        ops: Vec<(Priority, F)>,
    ) -> Result<Vec<TaskHandle<T>>>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let batch = {
            let mut state = self.inner.state.lock();
            state.next_batch += 1;
            state.next_batch
        };

        let (tasks, handles): (Vec<_>, Vec<_>) = ops
            .into_iter()
            .enumerate()
            .map(|(i, (priority, op))| {
                self.prepare(TaskId::named(format!("batch-{batch}-{i}")), priority, op)
            })
            .unzip();

        self.enqueue(tasks)?;
        Ok(handles)
    }

    fn prepare<T, F, Fut>(&self, id: TaskId, priority: Priority, op: F) -> (QueuedTask, TaskHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let task_timeout = self.inner.config.task_timeout();

        let job_id = id.clone();
        let job: Job = Box::new(move |dispatch: Dispatch| match dispatch {
            Dispatch::Cancel => {
                let _ = tx.send(TaskResult::cancelled(job_id, priority));
                None
            }
            Dispatch::Run(ctx) => Some(
                async move {
                    let wait = ctx.wait();
                    let retries = ctx.retry_counter();
                    let started = Instant::now();

                    let outcome = match task_timeout {
                        Some(limit) => tokio::time::timeout(limit, op(ctx))
                            .await
                            .unwrap_or_else(|_| Err(Error::timeout(job_id.as_str(), limit))),
                        None => op(ctx).await,
                    };

                    let completion = Completion {
                        success: outcome.is_ok(),
                        execution: started.elapsed(),
                        retries: retries.load(AtomicOrdering::Relaxed),
                    };
                    let _ = tx.send(TaskResult {
                        task_id: job_id,
                        priority,
                        outcome,
                        wait,
                        execution: completion.execution,
                        retries: completion.retries,
                    });
                    completion
                }
                .boxed(),
            ),
        });

        let task = QueuedTask {
            id: id.clone(),
            priority,
            seq: 0,
            submitted: Instant::now(),
            cancel: cancel.clone(),
            job,
        };
        (task, TaskHandle::new(id, priority, cancel, rx))
    }

    fn enqueue(&self, tasks: Vec<QueuedTask>) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::internal("scheduler used outside a tokio runtime"));
        }

        let count = tasks.len();
        {
            let mut state = self.inner.state.lock();
            if !state.accepting {
                return Err(Error::ShuttingDown);
            }

            let capacity = self.inner.config.max_queue_size;
            if state.queue.len() + state.running + count > capacity {
                state.totals.rejected += count as u64;
                warn!(
                    queued = state.queue.len(),
                    running = state.running,
                    capacity,
                    "Task queue full, rejecting submission"
                );
                return Err(Error::QueueFull { capacity });
            }

            for mut task in tasks {
                task.seq = state.next_seq;
                state.next_seq += 1;
                debug!(task_id = %task.id, priority = %task.priority, "Task queued");
                state.queue.push(task);
            }
            state.totals.submitted += count as u64;
        }

        Inner::pump(&self.inner);
        Ok(())
    }

    /// Wait until nothing is queued or running. Returns `false` on timeout.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().is_idle() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.inner.state.lock().is_idle();
            }
        }
    }

    /// Drop every queued task and signal running ones to stop.
    ///
    /// Returns the number of queued tasks removed; their handles resolve to
    /// [`Error::Cancelled`]. Running tasks only see their cancellation token.
    pub fn cancel_all(&self) -> usize {
        let (removed, idle) = {
            let mut state = self.inner.state.lock();
            let removed: Vec<QueuedTask> = state.queue.drain().collect();
            state.totals.cancelled += removed.len() as u64;
            for task in &removed {
                push_history(
                    &mut state.history,
                    TaskRecord {
                        task_id: task.id.clone(),
                        priority: task.priority,
                        state: TaskState::Cancelled,
                        wait_ms: task.submitted.elapsed().as_millis() as u64,
                        execution_ms: 0,
                        retries: 0,
                        finished_at: Utc::now(),
                    },
                );
            }
            (removed, state.is_idle())
        };

        let count = removed.len();
        for task in removed {
            task.cancel.cancel();
            let _ = (task.job)(Dispatch::Cancel);
        }

        let signalled = self.inner.running_tokens.len();
        for entry in self.inner.running_tokens.iter() {
            entry.value().cancel();
        }

        if idle {
            self.inner.idle.notify_waiters();
        }
        info!(removed = count, signalled, "Cancelled scheduled tasks");
        count
    }

    /// Stop accepting new tasks. Queued and running tasks are unaffected.
    pub fn close(&self) {
        self.inner.state.lock().accepting = false;
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.state.lock().accepting
    }

    pub fn worker_limit(&self) -> usize {
        self.inner.state.lock().worker_limit
    }

    /// The newest `limit` finished tasks, newest last.
    pub fn recent_tasks(&self, limit: usize) -> Vec<TaskRecord> {
        let state = self.inner.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let config = &self.inner.config;
        let state = self.inner.state.lock();
        let t = state.totals;
        let finished = t.completed + t.failed;
        let (avg_execution_ms, avg_wait_ms) = recent_averages(&state.history);

        SchedulerStats {
            total_submitted: t.submitted,
            completed: t.completed,
            failed: t.failed,
            rejected: t.rejected,
            cancelled: t.cancelled,
            success_rate: if finished == 0 {
                0.0
            } else {
                t.completed as f64 / finished as f64
            },
            active: state.running,
            queued: state.queue.len(),
            worker_limit: state.worker_limit,
            min_workers: config.min_workers(),
            max_workers: config.max_workers(),
            peak_concurrency: state.peak_concurrency,
            avg_execution_ms,
            avg_wait_ms,
            queue_utilization: state.queue.len() as f64 / config.max_queue_size as f64,
            pool_utilization: state.running as f64 / state.worker_limit as f64,
            window_samples: state.window.len(),
        }
    }
}

impl Inner {
    /// Spawn queued tasks while there is worker capacity.
    fn pump(inner: &Arc<Inner>) {
        let dispatched: Vec<(QueuedTask, Duration)> = {
            let mut state = inner.state.lock();
            let mut out = Vec::new();
            while state.running < state.worker_limit {
                let Some(task) = state.queue.pop() else {
                    break;
                };
                state.running += 1;
                state.peak_concurrency = state.peak_concurrency.max(state.running);
                let wait = task.submitted.elapsed();
                out.push((task, wait));
            }
            out
        };

        for (task, wait) in dispatched {
            let QueuedTask {
                id,
                priority,
                seq,
                cancel,
                job,
                ..
            } = task;

            inner.running_tokens.insert(seq, cancel.clone());
            let ctx = TaskContext::new(id.clone(), priority, cancel, wait);
            let fut = job(Dispatch::Run(ctx));
            let inner = inner.clone();

            debug!(task_id = %id, priority = %priority, wait_ms = wait.as_millis() as u64, "Task started");

            tokio::spawn(async move {
                let completion = match fut {
                    Some(fut) => AssertUnwindSafe(fut).catch_unwind().await.unwrap_or_else(|_| {
                        warn!(task_id = %id, "Task panicked");
                        Completion {
                            success: false,
                            execution: Duration::ZERO,
                            retries: 0,
                        }
                    }),
                    None => Completion {
                        success: false,
                        execution: Duration::ZERO,
                        retries: 0,
                    },
                };
                Inner::finish(&inner, seq, id, priority, wait, completion);
            });
        }
    }

    fn finish(
        inner: &Arc<Inner>,
        seq: u64,
        id: TaskId,
        priority: Priority,
        wait: Duration,
        done: Completion,
    ) {
        inner.running_tokens.remove(&seq);

        let idle = {
            let mut state = inner.state.lock();
            state.running = state.running.saturating_sub(1);
            if done.success {
                state.totals.completed += 1;
            } else {
                state.totals.failed += 1;
            }

            let now = Instant::now();
            state.window.push(now, wait, done.execution, done.success);
            push_history(
                &mut state.history,
                TaskRecord {
                    task_id: id.clone(),
                    priority,
                    state: if done.success {
                        TaskState::Completed
                    } else {
                        TaskState::Failed
                    },
                    wait_ms: wait.as_millis() as u64,
                    execution_ms: done.execution.as_millis() as u64,
                    retries: done.retries,
                    finished_at: Utc::now(),
                },
            );

            debug!(
                task_id = %id,
                success = done.success,
                execution_ms = done.execution.as_millis() as u64,
                "Task finished"
            );

            inner.maybe_adapt(&mut state, now);
            state.is_idle()
        };

        Inner::pump(inner);

        if idle {
            inner.idle.notify_waiters();
        }
    }

    fn maybe_adapt(&self, state: &mut SchedulerState, now: Instant) {
        let config = &self.config;
        if !config.adaptive
            || now.duration_since(state.last_adaptation) < config.adaptation_interval()
            || state.window.len() < config.min_samples
        {
            return;
        }
        let Some(summary) = state.window.summary(now, config.trailing_window()) else {
            return;
        };
        state.last_adaptation = now;

        let current = state.worker_limit;
        let next = match decide(&summary, &config.thresholds) {
            Adaptation::Grow => (current + 1).min(config.max_workers()),
            Adaptation::Shrink => current.saturating_sub(1).max(config.min_workers()),
            Adaptation::Hold => current,
        };

        if next != current {
            state.worker_limit = next;
            info!(
                from = current,
                to = next,
                success_rate = summary.success_rate,
                avg_wait_ms = summary.avg_wait.as_millis() as u64,
                avg_execution_ms = summary.avg_execution.as_millis() as u64,
                "Adjusted worker limit"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::sync::Semaphore;

    fn config(min: usize, max: usize, initial: usize) -> SchedulerConfig {
        SchedulerConfig {
            concurrency_bounds: (min, max),
            initial_workers: initial,
            ..Default::default()
        }
    }

    /// A task that waits until the gate opens, then returns `value`.
    fn gated<T: Send + 'static>(
        gate: &Arc<Semaphore>,
        value: T,
    ) -> impl FnOnce(TaskContext) -> futures::future::BoxFuture<'static, Result<T>> + Send + 'static
    {
        let gate = gate.clone();
        move |_ctx| {
            async move {
                let _permit = gate.acquire().await.map_err(|e| Error::internal(e.to_string()))?;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_submit_and_join() {
        let scheduler = AdaptiveScheduler::new(config(1, 4, 2));
        let handle = scheduler
            .submit(Priority::Normal, Some(TaskId::named("t1")), |ctx| async move {
                assert_eq!(ctx.id().as_str(), "t1");
                Ok(7)
            })
            .unwrap();

        let result = handle.join().await;
        assert_eq!(result.task_id.as_str(), "t1");
        assert_eq!(result.outcome.unwrap(), 7);

        assert!(scheduler.wait_for_completion(Duration::from_secs(1)).await);
        let stats = scheduler.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total_submitted, 1);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_dispatch_order_priority_then_fifo() {
        let scheduler = AdaptiveScheduler::new(config(1, 1, 1));
        let gate = Arc::new(Semaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let blocker = scheduler
            .submit(Priority::Critical, None, gated(&gate, ()))
            .unwrap();

        let mut handles = Vec::new();
        for (name, priority) in [
            ("low", Priority::Low),
            ("normal-1", Priority::Normal),
            ("critical", Priority::Critical),
            ("normal-2", Priority::Normal),
            ("high", Priority::High),
        ] {
            let order = order.clone();
            handles.push(
                scheduler
                    .submit(priority, None, move |_| async move {
                        order.lock().push(name);
                        Ok(())
                    })
                    .unwrap(),
            );
        }

        gate.add_permits(1);
        blocker.join().await.outcome.unwrap();
        for h in handles {
            h.join().await.outcome.unwrap();
        }

        assert_eq!(
            *order.lock(),
            vec!["critical", "high", "normal-1", "normal-2", "low"]
        );
    }

    #[tokio::test]
    async fn test_queue_full_backpressure() {
        let mut cfg = config(1, 1, 1);
        cfg.max_queue_size = 3;
        let scheduler = AdaptiveScheduler::new(cfg);
        let gate = Arc::new(Semaphore::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(scheduler.submit(Priority::Normal, None, gated(&gate, ())).unwrap());
        }
        let rejected = scheduler.submit(Priority::Critical, None, gated(&gate, ()));
        assert_matches!(rejected, Err(Error::QueueFull { capacity: 3 }));
        assert_eq!(scheduler.stats().rejected, 1);

        gate.add_permits(3);
        for h in handles {
            assert!(h.join().await.is_success());
        }
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let mut cfg = config(1, 1, 1);
        cfg.max_queue_size = 2;
        let scheduler = AdaptiveScheduler::new(cfg);
        let gate = Arc::new(Semaphore::new(0));

        let ops = (0..3usize).map(|i| (Priority::Normal, gated(&gate, i))).collect();
        assert_matches!(
            scheduler.submit_batch(ops),
            Err(Error::QueueFull { .. })
        );
        assert_eq!(scheduler.stats().queued, 0);
        assert_eq!(scheduler.stats().active, 0);

        gate.add_permits(2);
        let ops = (0..2usize).map(|i| (Priority::Normal, gated(&gate, i))).collect();
        let handles = scheduler.submit_batch(ops).unwrap();
        assert_eq!(handles[1].id().as_str(), "batch-2-1");
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().await.outcome.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_failure_is_captured_and_counted() {
        let scheduler = AdaptiveScheduler::new(config(1, 2, 1));
        let handle = scheduler
            .submit(Priority::Normal, None, |_| async {
                Err::<(), _>(Error::transient("https://a.example/", "reset"))
            })
            .unwrap();

        let result = handle.join().await;
        assert_eq!(result.state(), TaskState::Failed);
        assert!(scheduler.wait_for_completion(Duration::from_secs(1)).await);
        assert_eq!(scheduler.stats().failed, 1);
        assert_eq!(scheduler.recent_tasks(10)[0].state, TaskState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_times_out() {
        let scheduler = AdaptiveScheduler::new(config(1, 1, 1));
        let gate = Arc::new(Semaphore::new(0));
        let handle = scheduler.submit(Priority::Normal, None, gated(&gate, ())).unwrap();

        assert!(!scheduler.wait_for_completion(Duration::from_secs(5)).await);

        gate.add_permits(1);
        handle.join().await;
        assert!(scheduler.wait_for_completion(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_cancel_all_removes_queued_and_signals_running() {
        let scheduler = AdaptiveScheduler::new(config(1, 1, 1));
        let (started_tx, started_rx) = oneshot::channel();

        let running = scheduler
            .submit(Priority::Normal, None, move |ctx| async move {
                let _ = started_tx.send(());
                ctx.cancellation().cancelled().await;
                Err::<(), _>(Error::Cancelled)
            })
            .unwrap();
        started_rx.await.unwrap();

        let gate = Arc::new(Semaphore::new(0));
        let queued: Vec<_> = (0..3)
            .map(|_| scheduler.submit(Priority::Normal, None, gated(&gate, ())).unwrap())
            .collect();

        assert_eq!(scheduler.cancel_all(), 3);
        for h in queued {
            assert_eq!(h.join().await.state(), TaskState::Cancelled);
        }
        assert_eq!(running.join().await.state(), TaskState::Cancelled);

        assert!(scheduler.wait_for_completion(Duration::from_secs(1)).await);
        let stats = scheduler.stats();
        assert_eq!(stats.cancelled, 3);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_cancel_all_signals_running_task_sharing_an_id() {
        let scheduler = AdaptiveScheduler::new(config(2, 2, 2));
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, started_rx) = oneshot::channel();

        let first = scheduler
            .submit(Priority::Normal, Some(TaskId::named("dup")), gated(&gate, ()))
            .unwrap();
        let second = scheduler
            .submit(
                Priority::Normal,
                Some(TaskId::named("dup")),
                move |ctx| async move {
                    let _ = started_tx.send(());
                    ctx.cancellation().cancelled().await;
                    Err::<(), _>(Error::Cancelled)
                },
            )
            .unwrap();
        started_rx.await.unwrap();

        gate.add_permits(1);
        assert_eq!(first.join().await.state(), TaskState::Completed);

        assert_eq!(scheduler.cancel_all(), 0);
        let result = tokio::time::timeout(Duration::from_secs(1), second.join())
            .await
            .expect("running task with a reused id was not signalled");
        assert_eq!(result.state(), TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_close_rejects_new_work() {
        let scheduler = AdaptiveScheduler::new(config(1, 1, 1));
        scheduler.close();
        let result = scheduler.submit(Priority::Normal, None, |_| async { Ok(()) });
        assert_matches!(result, Err(Error::ShuttingDown));
        assert!(!scheduler.is_accepting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout() {
        let mut cfg = config(1, 1, 1);
        cfg.task_timeout_secs = 1;
        let scheduler = AdaptiveScheduler::new(cfg);

        let handle = scheduler
            .submit(Priority::Normal, None, |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .unwrap();
        assert_matches!(handle.join().await.outcome, Err(Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_retries_reported_through_context() {
        let scheduler = AdaptiveScheduler::new(config(1, 1, 1));
        let handle = scheduler
            .submit(Priority::Normal, None, |ctx| async move {
                ctx.record_retries(2);
                Ok(())
            })
            .unwrap();
        assert_eq!(handle.join().await.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let scheduler = AdaptiveScheduler::new(config(1, 3, 3));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                scheduler
                    .submit(Priority::Normal, None, |_| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();
        for h in handles {
            h.join().await;
        }
        assert_eq!(scheduler.stats().peak_concurrency, 3);
    }

    async fn run_batch(scheduler: &AdaptiveScheduler, n: usize, succeed: bool) {
        let handles: Vec<_> = (0..n)
            .map(|_| {
                scheduler
                    .submit(Priority::Normal, None, move |_| async move {
                        if succeed {
                            Ok(())
                        } else {
                            Err(Error::transient("https://a.example/", "reset"))
                        }
                    })
                    .unwrap()
            })
            .collect();
        for h in handles {
            h.join().await;
        }
        scheduler.wait_for_completion(Duration::from_secs(1)).await;
    }

    fn adaptive_config() -> SchedulerConfig {
        SchedulerConfig {
            concurrency_bounds: (1, 4),
            initial_workers: 2,
            adaptation_interval_secs: 60,
            min_samples: 5,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_grows_when_healthy() {
        let scheduler = AdaptiveScheduler::new(adaptive_config());
        run_batch(&scheduler, 5, true).await;
        // Interval has not elapsed yet.
        assert_eq!(scheduler.worker_limit(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        run_batch(&scheduler, 1, true).await;
        assert_eq!(scheduler.worker_limit(), 3);

        // At most once per interval.
        run_batch(&scheduler, 1, true).await;
        assert_eq!(scheduler.worker_limit(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinks_when_failing_and_respects_floor() {
        let scheduler = AdaptiveScheduler::new(adaptive_config());
        run_batch(&scheduler, 5, false).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        run_batch(&scheduler, 1, false).await;
        assert_eq!(scheduler.worker_limit(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        run_batch(&scheduler, 1, false).await;
        assert_eq!(scheduler.worker_limit(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_adaptation_below_min_samples() {
        let scheduler = AdaptiveScheduler::new(adaptive_config());
        tokio::time::advance(Duration::from_secs(61)).await;
        run_batch(&scheduler, 3, true).await;
        assert_eq!(scheduler.worker_limit(), 2);
    }
}
