use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::model::{ResultLog, Task, TaskCompletion, TaskWork, WorkFactory, spawn_work};
use crate::deferred::{Resolver, deferred};
use crate::error::{TaskError, TaskFailure};

type BuildWork = Box<dyn FnOnce() -> TaskWork + Send>;

/// Runs its work exactly once and cannot be resumed.
///
/// Pausing only waits for the work to finish on its own; the manager
/// interrupts the bot first so that it does.
pub struct OneShotTask {
    label: String,
    build: Mutex<Option<BuildWork>>,
    running: Mutex<Option<JoinHandle<()>>>,
    done: TaskCompletion,
    resolver: Resolver<(), TaskFailure>,
    log: ResultLog,
}

impl OneShotTask {
    pub fn new<Fut>(label: impl Into<String>, work: Fut) -> Self
    where
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        Self::from_work(label, Box::pin(work))
    }

    pub fn from_work(label: impl Into<String>, work: TaskWork) -> Self {
        Self::build_with(label, Box::new(move || work))
    }

    /// The factory is only called when the task starts.
    pub fn from_factory(label: impl Into<String>, factory: WorkFactory) -> Self {
        Self::build_with(label, Box::new(move || factory()))
    }

    fn build_with(label: impl Into<String>, build: BuildWork) -> Self {
        let (done, resolver) = deferred();
        Self {
            label: label.into(),
            build: Mutex::new(Some(build)),
            running: Mutex::new(None),
            done,
            resolver,
            log: ResultLog::default(),
        }
    }

    /// Build the work from a closure that receives the task's result log.
    pub fn with_log<F, Fut>(label: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(ResultLog) -> Fut,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        let log = ResultLog::default();
        let mut task = Self::new(label, build(log.clone()));
        task.log = log;
        task
    }

    fn running(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Task for OneShotTask {
    fn label(&self) -> &str {
        &self.label
    }

    async fn start(&self) -> Result<(), TaskError> {
        let build = self
            .build
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| TaskError::AlreadyStarted {
                label: self.label.clone(),
            })?;
        let resolver = self.resolver.clone();
        let handle = spawn_work(build(), move |result| {
            resolver.settle(result);
        });
        *self.running() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), TaskError> {
        // Either outcome means the work has stopped.
        let _ = self.done.wait().await;
        Ok(())
    }

    async fn resume(&self) -> Result<(), TaskError> {
        Err(TaskError::NotResumable {
            label: self.label.clone(),
        })
    }

    fn when_done(&self) -> TaskCompletion {
        self.done.clone()
    }

    fn abort(&self) {
        if let Some(handle) = self.running().take() {
            handle.abort();
        }
    }

    fn result_log(&self) -> String {
        self.log.text()
    }
}
