//! Cancellable background tasks
//!
//! Wraps a tokio `JoinHandle` with a name, so the transport can own its
//! connection and polling loops and cancel them on teardown.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A named task spawned on the tokio runtime
pub struct ScheduledTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `future` on the current runtime.
    ///
    /// Panics if called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("Starting {} task", name);
        Self {
            name,
            handle: Some(tokio::spawn(future)),
        }
    }

    /// A task slot with nothing running in it
    pub fn idle(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether the task is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Abort the task. Returns true if it was still running.
    pub fn cancel(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };

        let was_running = !handle.is_finished();
        handle.abort();
        if was_running {
            tracing::debug!("Cancelled {} task", self.name);
        }
        was_running
    }

    /// Wait up to `grace` for the task to finish on its own, then abort it.
    ///
    /// Returns true if the task exited without being aborted.
    pub async fn join(&mut self, grace: Duration) -> bool {
        let outcome = match self.handle.as_mut() {
            Some(handle) => tokio::time::timeout(grace, handle).await,
            None => return true,
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = result {
                    if e.is_panic() {
                        tracing::error!("{} task panicked: {}", self.name, e);
                    }
                }
                self.handle = None;
                true
            }
            Err(_) => {
                tracing::warn!("{} task did not stop within {:?}, aborting", self.name, grace);
                self.cancel();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_stops_running_task() {
        let mut task = ScheduledTask::spawn("sleeper", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(task.is_running());
        assert!(task.cancel());
        assert!(!task.is_running());
        // Second cancel is a no-op
        assert!(!task.cancel());
    }

    #[tokio::test]
    async fn test_join_waits_for_natural_exit() {
        let mut task = ScheduledTask::spawn("quick", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        assert!(task.join(Duration::from_secs(5)).await);
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_join_aborts_after_grace() {
        let mut task = ScheduledTask::spawn("stuck", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(!task.join(Duration::from_millis(20)).await);
        assert!(!task.is_running());
        assert_eq!(task.name(), "stuck");
    }

    #[tokio::test]
    async fn test_idle_task() {
        let mut task = ScheduledTask::idle("nothing");
        assert!(!task.is_running());
        assert!(!task.cancel());
        assert!(task.join(Duration::from_millis(1)).await);
    }
}
