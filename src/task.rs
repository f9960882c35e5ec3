//! Background task lifecycle
//!
//! Probe loops, the expiry sweeper and the HTTP accept loops all run as
//! spawned tokio tasks driven by a [`CancellationToken`]. The handle returned
//! when they are started is the only way to stop them.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle to a running background loop
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `task` with a child of `parent`.
    ///
    /// The task receives its own token and must return once it is cancelled.
    pub fn spawn<F, Fut>(name: impl Into<String>, parent: &CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let handle = tokio::spawn(task(cancel.clone()));
        Self {
            name: name.into(),
            cancel,
            handle,
        }
    }

    /// Task name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the task already returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signal the task to stop and wait until it has returned
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Background task {} ended abnormally: {}", self.name, e);
        }
    }
}

/// Signal every handle first, then wait for each in order
pub async fn stop_all(handles: Vec<TaskHandle>) {
    for handle in &handles {
        handle.cancel();
    }
    for handle in handles {
        handle.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_waits_for_task() {
        let root = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let handle = TaskHandle::spawn("test", &root, move |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(handle.name(), "test");
        assert!(!handle.is_finished());

        handle.stop().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_all_signals_every_task_before_waiting() {
        let root = CancellationToken::new();
        let second_stopped = CancellationToken::new();

        // The first task only returns once the second one was cancelled too
        let gate = second_stopped.clone();
        let first = TaskHandle::spawn("first", &root, move |cancel| async move {
            cancel.cancelled().await;
            gate.cancelled().await;
        });
        let seen = second_stopped.clone();
        let second = TaskHandle::spawn("second", &root, move |cancel| async move {
            cancel.cancelled().await;
            seen.cancel();
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), stop_all(vec![first, second]))
            .await
            .expect("stop_all should not wait on a task before cancelling the rest");
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_task() {
        let root = CancellationToken::new();
        let handle = TaskHandle::spawn("child", &root, |cancel| async move {
            cancel.cancelled().await;
        });

        root.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("task should observe parent cancellation");
    }
}
