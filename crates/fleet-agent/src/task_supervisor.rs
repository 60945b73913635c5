// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task supervisor.
//!
//! Owns the set of in-flight job tasks. Each task is paired with a
//! [`CompletionFlag`] that only the task sets; the supervisor only reads it
//! to decide which tasks can be reclaimed. Reclaiming never waits on a task
//! that has not signalled completion.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often [`TaskSupervisor::shutdown`] re-checks outstanding tasks.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Single-writer completion signal shared by a task and the supervisor.
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag(Arc<AtomicBool>);

impl CompletionFlag {
    /// A flag that is not set yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the task as finished.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the task has finished.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Guard that sets the flag when dropped, including during unwinding.
    pub fn guard(&self) -> CompletionGuard {
        CompletionGuard(self.clone())
    }
}

/// Sets its [`CompletionFlag`] on drop.
#[derive(Debug)]
pub struct CompletionGuard(CompletionFlag);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Errors from [`TaskSupervisor::spawn`].
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The supervisor is shutting down and accepts no new tasks.
    #[error("{0} is shutting down")]
    ShuttingDown(String),
}

struct TaskEntry {
    task_id: String,
    handle: JoinHandle<()>,
    done: CompletionFlag,
}

/// Registry of running tasks.
pub struct TaskSupervisor {
    name: String,
    tasks: Mutex<Vec<TaskEntry>>,
    accepting: AtomicBool,
    shutdown: Arc<Notify>,
}

impl TaskSupervisor {
    /// Create a supervisor; `name` is used in log lines.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<TaskEntry>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start `task` concurrently and register it under `task_id`.
    ///
    /// `done` must be set by the task when it exits. Finished tasks are
    /// reclaimed first so the registry does not grow unbounded.
    pub fn spawn<F>(&self, task_id: &str, done: CompletionFlag, task: F) -> Result<(), SpawnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reclaim();

        if !self.accepting.load(Ordering::Acquire) {
            return Err(SpawnError::ShuttingDown(self.name.clone()));
        }

        let handle = tokio::spawn(task);
        self.tasks().push(TaskEntry {
            task_id: task_id.to_string(),
            handle,
            done,
        });

        debug!(supervisor = %self.name, task_id = %task_id, "Task spawned");
        Ok(())
    }

    /// Join and remove every task whose completion flag is set and whose
    /// execution has ended. Returns how many tasks were reclaimed.
    ///
    /// A task that set its flag but is still unwinding stays registered
    /// until a later call.
    pub fn reclaim(&self) -> usize {
        let finished: Vec<TaskEntry> = {
            let mut tasks = self.tasks();
            let (finished, running): (Vec<_>, Vec<_>) = tasks
                .drain(..)
                .partition(|entry| entry.done.is_set() && entry.handle.is_finished());
            *tasks = running;
            finished
        };

        let mut reclaimed = 0;
        let mut not_ready = Vec::new();
        for mut entry in finished {
            match (&mut entry.handle).now_or_never() {
                Some(Ok(())) => {
                    debug!(supervisor = %self.name, task_id = %entry.task_id, "Task reclaimed");
                    reclaimed += 1;
                }
                Some(Err(e)) if e.is_panic() => {
                    error!(
                        supervisor = %self.name,
                        task_id = %entry.task_id,
                        error = %e,
                        "Task panicked"
                    );
                    reclaimed += 1;
                }
                Some(Err(e)) => {
                    warn!(
                        supervisor = %self.name,
                        task_id = %entry.task_id,
                        error = %e,
                        "Task was cancelled"
                    );
                    reclaimed += 1;
                }
                None => not_ready.push(entry),
            }
        }

        if !not_ready.is_empty() {
            self.tasks().extend(not_ready);
        }
        reclaimed
    }

    /// Number of registered tasks (finished but unreclaimed ones included).
    pub fn active_count(&self) -> usize {
        self.tasks().len()
    }

    /// Whether new tasks are accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Get a handle that can be used to stop [`run_sweeper`](Self::run_sweeper).
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Reclaim finished tasks every `interval` until shutdown is signalled.
    pub async fn run_sweeper(&self, interval: Duration) {
        info!(
            supervisor = %self.name,
            interval_ms = interval.as_millis() as u64,
            "Task sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!(supervisor = %self.name, "Task sweeper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(interval) => {
                    let reclaimed = self.reclaim();
                    if reclaimed > 0 {
                        debug!(
                            supervisor = %self.name,
                            reclaimed = reclaimed,
                            active = self.active_count(),
                            "Sweep completed"
                        );
                    }
                }
            }
        }

        info!(supervisor = %self.name, "Task sweeper stopped");
    }

    /// Stop accepting tasks and wait until every registered task has
    /// signalled completion and been reclaimed.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        self.shutdown.notify_one();

        let outstanding = self.active_count();
        if outstanding > 0 {
            info!(
                supervisor = %self.name,
                outstanding = outstanding,
                "Waiting for outstanding tasks to complete"
            );
        }

        loop {
            self.reclaim();
            if self.active_count() == 0 {
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }

        info!(supervisor = %self.name, "All tasks completed");
    }
}

impl Drop for TaskSupervisor {
    fn drop(&mut self) {
        let remaining = self.active_count();
        if remaining > 0 {
            warn!(
                supervisor = %self.name,
                remaining = remaining,
                "Supervisor dropped with tasks still registered; they keep running detached"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    /// Reclaim until `expected` tasks were joined in total.
    async fn reclaim_exactly(supervisor: &TaskSupervisor, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            let mut total = 0;
            while total < expected {
                total += supervisor.reclaim();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(total, expected);
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_completion_guard_sets_flag() {
        let flag = CompletionFlag::new();
        assert!(!flag.is_set());
        {
            let _guard = flag.guard();
        }
        assert!(flag.is_set());
    }

    #[tokio::test]
    async fn test_reclaim_skips_unfinished_tasks() {
        let supervisor = TaskSupervisor::new("test");
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let flag = CompletionFlag::new();
        let task_flag = flag.clone();

        supervisor
            .spawn("job-1", flag.clone(), async move {
                let _guard = task_flag.guard();
                let _ = release_rx.await;
            })
            .unwrap();

        assert_eq!(supervisor.reclaim(), 0);
        assert_eq!(supervisor.active_count(), 1);

        release_tx.send(()).unwrap();
        reclaim_exactly(&supervisor, 1).await;

        assert!(flag.is_set());
        assert_eq!(supervisor.reclaim(), 0);
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_flagged_task_still_running_is_kept() {
        let supervisor = TaskSupervisor::new("test");
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let flag = CompletionFlag::new();
        let task_flag = flag.clone();

        supervisor
            .spawn("job-late-exit", flag.clone(), async move {
                task_flag.set();
                let _ = release_rx.await;
            })
            .unwrap();

        while !flag.is_set() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(supervisor.reclaim(), 0);
        assert_eq!(supervisor.active_count(), 1);

        release_tx.send(()).unwrap();
        reclaim_exactly(&supervisor, 1).await;
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_panicked_task_is_joined_once() {
        let supervisor = TaskSupervisor::new("test");
        let flag = CompletionFlag::new();
        let task_flag = flag.clone();

        supervisor
            .spawn("job-panic", flag, async move {
                let _guard = task_flag.guard();
                panic!("reply sender blew up");
            })
            .unwrap();

        reclaim_exactly(&supervisor, 1).await;
        assert_eq!(supervisor.reclaim(), 0);
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reclaimable() {
        let supervisor = TaskSupervisor::new("test");
        let flag = CompletionFlag::new();
        let task_flag = flag.clone();

        supervisor
            .spawn("job-panic", flag.clone(), async move {
                let _guard = task_flag.guard();
                panic!("task blew up");
            })
            .unwrap();

        supervisor.shutdown().await;

        assert!(flag.is_set());
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_rejected_after_shutdown() {
        let supervisor = TaskSupervisor::new("Action Executer");
        supervisor.shutdown().await;

        let err = supervisor
            .spawn("late", CompletionFlag::new(), async {})
            .unwrap_err();

        assert!(!supervisor.is_accepting());
        assert_eq!(err.to_string(), "Action Executer is shutting down");
    }

    #[tokio::test]
    async fn test_sweeper_reclaims_and_stops() {
        let supervisor = Arc::new(TaskSupervisor::new("test"));
        let flag = CompletionFlag::new();
        let task_flag = flag.clone();
        supervisor
            .spawn("quick", flag, async move {
                task_flag.set();
            })
            .unwrap();

        let sweeper = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run_sweeper(Duration::from_millis(10)).await })
        };

        tokio::time::timeout(Duration::from_secs(2), async {
            while supervisor.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        supervisor.shutdown_handle().notify_one();
        tokio::time::timeout(Duration::from_secs(2), sweeper)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_spawn_reclaims_opportunistically() {
        let supervisor = TaskSupervisor::new("test");
        let first = CompletionFlag::new();
        first.set();
        supervisor.spawn("done", first, async {}).unwrap();
        assert_eq!(supervisor.active_count(), 1);

        // Let the first task run to its end
        tokio::time::sleep(Duration::from_millis(20)).await;

        supervisor
            .spawn("next", CompletionFlag::new(), std::future::pending())
            .unwrap();

        assert_eq!(supervisor.active_count(), 1);
    }
}
