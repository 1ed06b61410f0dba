use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::model::{Task, TaskCompletion, TaskWork, spawn_work};
use crate::deferred::{Resolver, deferred};
use crate::error::{TaskError, TaskFailure};
use crate::skills::{Capabilities, Pausable, PauseControl, Restartable};

/// Task whose work talks to the bot only through a pausable capability set.
///
/// Pausing closes the capability gate, so the work is suspended at its next
/// skill call; resuming opens it again. With a [`Restartable`] set the calls
/// abandoned by the bot's interrupt are issued again on resume.
pub struct GatedTask<P> {
    label: String,
    skills: Arc<P>,
    work: Mutex<Option<TaskWork>>,
    running: Mutex<Option<JoinHandle<()>>>,
    done: TaskCompletion,
    resolver: Resolver<(), TaskFailure>,
}

impl<P> GatedTask<P>
where
    P: Capabilities + PauseControl + 'static,
{
    pub fn new<F, Fut>(label: impl Into<String>, skills: Arc<P>, action: F) -> Self
    where
        F: FnOnce(Arc<P>) -> Fut,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        let (done, resolver) = deferred();
        let work: TaskWork = Box::pin(action(skills.clone()));
        Self {
            label: label.into(),
            work: Mutex::new(Some(work)),
            running: Mutex::new(None),
            skills,
            done,
            resolver,
        }
    }

    pub fn skills(&self) -> &Arc<P> {
        &self.skills
    }
}

impl<C: Capabilities + 'static> GatedTask<Pausable<C>> {
    /// Gated task over a plain pausable wrapper around `inner`.
    pub fn pausable<F, Fut>(label: impl Into<String>, inner: C, action: F) -> Self
    where
        F: FnOnce(Arc<Pausable<C>>) -> Fut,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        Self::new(label, Arc::new(Pausable::new(inner)), action)
    }
}

impl<C: Capabilities + 'static> GatedTask<Restartable<C>> {
    /// Gated task that resubmits abandoned skill calls on resume.
    pub fn restartable<F, Fut>(label: impl Into<String>, inner: C, action: F) -> Self
    where
        F: FnOnce(Arc<Restartable<C>>) -> Fut,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        Self::new(label, Arc::new(Restartable::new(inner)), action)
    }
}

#[async_trait]
impl<P> Task for GatedTask<P>
where
    P: Capabilities + PauseControl + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn start(&self) -> Result<(), TaskError> {
        let work = self
            .work
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| TaskError::AlreadyStarted {
                label: self.label.clone(),
            })?;
        let resolver = self.resolver.clone();
        let handle = spawn_work(work, move |result| {
            resolver.settle(result);
        });
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), TaskError> {
        self.skills.pause();
        Ok(())
    }

    async fn resume(&self) -> Result<(), TaskError> {
        self.skills.resume();
        Ok(())
    }

    fn when_done(&self) -> TaskCompletion {
        self.done.clone()
    }

    /// Drop the work, including any call held at the closed gate.
    fn abort(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = running {
            handle.abort();
        }
    }
}
