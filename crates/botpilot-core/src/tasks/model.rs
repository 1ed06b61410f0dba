//! Task contract shared by every task variant.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::deferred::Completion;
use crate::error::{TaskError, TaskFailure};

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Generate a new unique task ID.
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The unit of work a task runs.
pub type TaskWork = BoxFuture<'static, Result<(), TaskFailure>>;

/// Produces a fresh unit of work each time it is called.
pub type WorkFactory = Arc<dyn Fn() -> TaskWork + Send + Sync>;

/// Settles once the task's work has finished for good.
pub type TaskCompletion = Completion<(), TaskFailure>;

/// A unit of schedulable work.
///
/// `start` only kicks the work off; the outcome arrives through
/// [`Task::when_done`]. `pause` returns once the task has stopped making
/// progress, `resume` continues it.
#[async_trait]
pub trait Task: Send + Sync {
    fn label(&self) -> &str;

    async fn start(&self) -> Result<(), TaskError>;

    async fn pause(&self) -> Result<(), TaskError>;

    async fn resume(&self) -> Result<(), TaskError>;

    /// Completion of the task as a whole, across pause/resume cycles.
    fn when_done(&self) -> TaskCompletion;

    /// Drop whatever work is still attached without settling the
    /// completion. Used when a queued task is retired.
    fn abort(&self) {}

    /// Text the task's work appended to its own result log.
    fn result_log(&self) -> String {
        String::new()
    }
}

/// Append-only text log a task's work can write to.
#[derive(Debug, Clone, Default)]
pub struct ResultLog(Arc<Mutex<String>>);

impl ResultLog {
    pub fn append(&self, line: &str) {
        let mut log = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(line);
    }

    pub fn text(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Drive `work` on the runtime and hand its result to `on_done`.
///
/// A panic inside the work is reported as a failure instead of being lost
/// with the spawned task.
pub(crate) fn spawn_work<F>(work: TaskWork, on_done: F) -> JoinHandle<()>
where
    F: FnOnce(Result<(), TaskFailure>) + Send + 'static,
{
    tokio::spawn(async move {
        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(TaskFailure::new(format!(
                "task panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        on_done(result);
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::deferred;

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert_eq!(format!("{}", TaskId(7)), "#7");
    }

    #[test]
    fn result_log_joins_lines() {
        let log = ResultLog::default();
        log.append("collected 3 oak_log");
        log.append("crafted planks");
        assert_eq!(log.text(), "collected 3 oak_log\ncrafted planks");
    }

    #[tokio::test]
    async fn panicking_work_is_reported_as_failure() {
        let (done, resolver) = deferred::<(), TaskFailure>();
        let work: TaskWork = Box::pin(async {
            if true {
                panic!("pathfinder exploded");
            }
            Ok::<(), TaskFailure>(())
        });
        spawn_work(work, move |r| {
            resolver.settle(r);
        });
        let err = done.wait().await.unwrap_err();
        assert_eq!(err.message, "task panicked: pathfinder exploded");
    }
}
