use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use super::model::{Task, TaskCompletion, TaskWork, WorkFactory, spawn_work};
use crate::deferred::{Resolver, deferred};
use crate::error::{TaskError, TaskFailure};

type PauseHook = Arc<dyn Fn() + Send + Sync>;

/// Task that can be paused and picked up again later.
///
/// Every start or resume launches a fresh run from the work factory. A pause
/// discards the current run and calls the pause hook, which is expected to
/// make the discarded run wind down. A discarded run never settles the
/// task's completion, even if it finishes afterwards.
pub struct ResumableTask {
    label: String,
    factory: WorkFactory,
    on_pause: Option<PauseHook>,
    done: TaskCompletion,
    resolver: Resolver<(), TaskFailure>,
    generation: Arc<AtomicU64>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl ResumableTask {
    pub fn new<F, Fut>(label: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        let (done, resolver) = deferred();
        Self {
            label: label.into(),
            factory: Arc::new(move || -> TaskWork { Box::pin(factory()) }),
            on_pause: None,
            done,
            resolver,
            generation: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(None),
        }
    }

    /// Hook called when the task is paused, after its run is discarded.
    pub fn on_pause<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_pause = Some(Arc::new(hook));
        self
    }

    /// Whether a run is currently attached to the task.
    pub fn is_running(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launch(&self) {
        let mut current = self.current();
        let run = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let resolver = self.resolver.clone();
        let label = self.label.clone();
        let handle = spawn_work((self.factory)(), move |result| {
            if generation.load(Ordering::SeqCst) == run {
                resolver.settle(result);
            } else {
                debug!(label = %label, run, "Discarded run finished");
            }
        });
        *current = Some(handle);
    }
}

#[async_trait]
impl Task for ResumableTask {
    fn label(&self) -> &str {
        &self.label
    }

    /// Launch a fresh run, discarding any run already attached.
    async fn start(&self) -> Result<(), TaskError> {
        self.launch();
        Ok(())
    }

    async fn pause(&self) -> Result<(), TaskError> {
        let discarded = self.current().take();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_pause {
            hook();
        }
        // The discarded run is left to wind down on its own.
        drop(discarded);
        Ok(())
    }

    /// Launch a fresh run unless one is already attached.
    async fn resume(&self) -> Result<(), TaskError> {
        if self.done.is_settled() || self.is_running() {
            return Ok(());
        }
        self.launch();
        Ok(())
    }

    fn when_done(&self) -> TaskCompletion {
        self.done.clone()
    }

    fn abort(&self) {
        let current = self.current().take();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = current {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn completes_when_a_run_finishes() {
        let task = ResumableTask::new("goal", || async { Ok::<(), TaskFailure>(()) });
        task.start().await.unwrap();
        task.when_done().wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_run_does_not_settle_completion() {
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let task = ResumableTask::new("goal", {
            let runs = runs.clone();
            let release = release.clone();
            move || {
                let n = runs.fetch_add(1, Ordering::SeqCst);
                let release = release.clone();
                async move {
                    if n == 0 {
                        release.notified().await;
                        return Err(TaskFailure::new("stale run"));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                }
            }
        });

        task.start().await.unwrap();
        tokio::task::yield_now().await;
        task.pause().await.unwrap();
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.when_done().is_settled());

        task.resume().await.unwrap();
        assert_eq!(task.when_done().wait().await, Ok(()));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pause_calls_hook_and_resume_restarts() {
        let paused = Arc::new(AtomicUsize::new(0));
        let task = ResumableTask::new("goal", || std::future::pending::<Result<(), TaskFailure>>())
            .on_pause({
                let paused = paused.clone();
                move || {
                    paused.fetch_add(1, Ordering::SeqCst);
                }
            });

        task.start().await.unwrap();
        assert!(task.is_running());
        task.pause().await.unwrap();
        assert!(!task.is_running());
        assert_eq!(paused.load(Ordering::SeqCst), 1);

        task.resume().await.unwrap();
        assert!(task.is_running());
        // Resuming an attached run is a no-op.
        task.resume().await.unwrap();
        assert!(task.is_running());
    }
}
