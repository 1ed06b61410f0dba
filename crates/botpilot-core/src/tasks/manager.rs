//! Single-flight task manager.
//!
//! At most one task executes at a time. Starting a new task stops the
//! executing one first and stacks the new one on top; when a task finishes
//! the one below it is picked up again. A task that does not pause within
//! the stop timeout, or that fails on its own, halts the manager and asks
//! the agent to kill the process.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::events::TaskEvent;
use super::model::{Task, TaskCompletion, TaskId, TaskWork, WorkFactory};
use super::one_shot::OneShotTask;
use super::outcome::{ExecStatus, TaskOutcome, summarize_output};
use crate::agent::Agent;
use crate::config::{SchedulerConfig, minutes};
use crate::deferred::{Resolver, deferred};
use crate::error::TaskFailure;

/// Options for [`TaskManager::run_task`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Wall-clock limit. `None` uses the configured default, zero disables it.
    pub timeout: Option<Duration>,
    /// Remember the task so it can be run again with
    /// [`TaskManager::resume_task`].
    pub resume: bool,
}

impl RunOptions {
    pub fn timeout_mins(mins: u64) -> Self {
        Self {
            timeout: Some(minutes(mins)),
            ..Default::default()
        }
    }

    pub fn resumable(mut self) -> Self {
        self.resume = true;
        self
    }
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerSnapshot {
    pub executing: bool,
    pub halted: Option<ExecStatus>,
    /// Queued tasks, the executing (or most recently paused) one first.
    pub queue: Vec<QueuedTask>,
    /// Label of the task remembered for `resume_task`.
    pub resume_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedTask {
    pub id: TaskId,
    pub label: String,
}

/// How the manager let go of a task, as seen by its `run` caller.
type Report = Option<Result<(), TaskFailure>>;

#[derive(Default)]
struct RunRecord {
    interrupted: AtomicBool,
    timed_out: AtomicBool,
    output: Mutex<String>,
}

impl RunRecord {
    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    fn append_output(&self, captured: &str) {
        if captured.is_empty() {
            return;
        }
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(captured);
    }

    fn output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Entry {
    id: TaskId,
    label: String,
    task: Arc<dyn Task>,
    record: Arc<RunRecord>,
    report: Resolver<Report, Infallible>,
    watcher: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl Entry {
    fn publish(&self, report: Report) {
        self.report.resolve(report);
    }
}

#[derive(Clone)]
struct ResumeIntent {
    label: String,
    factory: WorkFactory,
    timeout: Option<Duration>,
}

#[derive(Default)]
struct State {
    /// Front is the executing or most recently paused task.
    queue: VecDeque<Entry>,
    executing: bool,
    halted: Option<ExecStatus>,
    resume: Option<ResumeIntent>,
}

impl State {
    fn front_is(&self, id: TaskId) -> bool {
        self.queue.front().is_some_and(|e| e.id == id)
    }

    fn entry_mut(&mut self, id: TaskId) -> Option<&mut Entry> {
        self.queue.iter_mut().find(|e| e.id == id)
    }

    fn remove(&mut self, id: TaskId) -> Option<Entry> {
        let index = self.queue.iter().position(|e| e.id == id)?;
        self.queue.remove(index)
    }
}

struct Shared {
    agent: Arc<dyn Agent>,
    config: SchedulerConfig,
    events: broadcast::Sender<TaskEvent>,
    state: Mutex<State>,
    /// Serializes every transition that awaits a task (start, pause,
    /// resume), so a stop always finishes before the next start begins.
    sched: tokio::sync::Mutex<()>,
    halt: CancellationToken,
}

#[derive(Clone, Copy)]
enum Phase {
    Start,
    Resume,
}

/// Single-flight scheduler for an agent's tasks.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct TaskManager {
    shared: Arc<Shared>,
}

impl TaskManager {
    pub fn new(agent: Arc<dyn Agent>, config: SchedulerConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "Scheduler config is out of range, clamping");
        }
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                agent,
                config,
                events,
                state: Mutex::new(State::default()),
                sched: tokio::sync::Mutex::new(()),
                halt: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_executing(&self) -> bool {
        self.state().executing
    }

    /// The fatal status the manager halted with, if it has.
    pub fn halted(&self) -> Option<ExecStatus> {
        self.state().halted
    }

    /// Label of the executing task.
    pub fn current_label(&self) -> Option<String> {
        let state = self.state();
        if !state.executing {
            return None;
        }
        state.queue.front().map(|e| e.label.clone())
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        let state = self.state();
        ManagerSnapshot {
            executing: state.executing,
            halted: state.halted,
            queue: state
                .queue
                .iter()
                .map(|e| QueuedTask {
                    id: e.id,
                    label: e.label.clone(),
                })
                .collect(),
            resume_label: state.resume.as_ref().map(|r| r.label.clone()),
        }
    }

    /// Run a one-shot task built from `start_fn` and wait for its outcome.
    ///
    /// With [`RunOptions::resume`] the task is also remembered for
    /// [`resume_task`](Self::resume_task), and it only runs if the agent is
    /// idle.
    pub async fn run_task<F, Fut>(
        &self,
        label: impl Into<String>,
        start_fn: F,
        opts: RunOptions,
    ) -> TaskOutcome
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        let label = label.into();
        let factory: WorkFactory = Arc::new(move || -> TaskWork { Box::pin(start_fn()) });
        if opts.resume {
            self.state().resume = Some(ResumeIntent {
                label,
                factory,
                timeout: opts.timeout,
            });
            return self.run_resume_intent(true).await;
        }
        let task = Arc::new(OneShotTask::from_factory(label, factory));
        self.run(task, opts.timeout).await
    }

    /// Run the remembered resumable task again, if the agent is idle and
    /// not pursuing a self-prompted goal.
    pub async fn resume_task(&self) -> TaskOutcome {
        self.run_resume_intent(false).await
    }

    /// Forget the remembered resumable task.
    pub fn cancel_resume(&self) {
        if let Some(intent) = self.state().resume.take() {
            debug!(label = %intent.label, "Resume cancelled");
        }
    }

    async fn run_resume_intent(&self, fresh: bool) -> TaskOutcome {
        let Some(intent) = self.state().resume.clone() else {
            return TaskOutcome::skipped();
        };
        let agent = &self.shared.agent;
        if !agent.is_idle() || (!fresh && agent.self_prompter().is_on()) {
            debug!(label = %intent.label, "Agent busy, not running resumable task");
            return TaskOutcome::skipped();
        }
        let task = Arc::new(OneShotTask::from_factory(intent.label, intent.factory));
        self.run(task, intent.timeout).await
    }

    /// Run `task` on top of the queue and wait until the manager lets go of
    /// it.
    ///
    /// `timeout` of `None` uses the configured default; a zero duration
    /// disables the limit.
    #[instrument(skip_all, fields(label = %task.label()))]
    pub async fn run(&self, task: Arc<dyn Task>, timeout: Option<Duration>) -> TaskOutcome {
        let source = task.clone();
        let (id, reported, record) = {
            let _sched = self.shared.sched.lock().await;
            if let Some(status) = self.halted() {
                return TaskOutcome::fatal(status, "task manager has halted");
            }
            if self.is_executing() {
                info!(
                    current = ?self.current_label(),
                    "New task is interrupting the current one"
                );
                let status = self.stop_locked().await;
                if status.is_fatal() {
                    return TaskOutcome::fatal(status, "previous task could not be stopped");
                }
            }

            let (reported, resolver) = deferred::<Report, Infallible>();
            let record = Arc::new(RunRecord::default());
            let id = TaskId::new();
            self.state().queue.push_front(Entry {
                id,
                label: task.label().to_string(),
                task,
                record: record.clone(),
                report: resolver,
                watcher: None,
                timer: None,
            });

            if let Err(status) = self.begin_locked(id, Phase::Start).await {
                return TaskOutcome::fatal(status, "task failed to start");
            }
            if let Some(after) = self.effective_timeout(timeout) {
                self.arm_timer(id, after);
            }
            (id, reported, record)
        };

        tokio::select! {
            biased;
            result = reported.wait() => match result {
                Ok(report) => self.outcome(id, report, &record, &source.result_log()),
                Err(never) => match never {},
            },
            _ = self.shared.halt.cancelled() => {
                let status = self.halted().unwrap_or(ExecStatus::UncaughtError);
                TaskOutcome::fatal(status, "task manager has halted")
            }
        }
    }

    /// Stop the executing task, leaving it queued.
    ///
    /// Returns [`ExecStatus::Ok`] when nothing is executing.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> ExecStatus {
        let _sched = self.shared.sched.lock().await;
        self.stop_locked().await
    }

    /// Pick the queue up again after [`stop`](Self::stop).
    #[instrument(skip(self))]
    pub async fn start(&self) -> ExecStatus {
        let _sched = self.shared.sched.lock().await;
        {
            let state = self.state();
            if let Some(status) = state.halted {
                return status;
            }
            if state.executing || state.queue.is_empty() {
                return ExecStatus::Ok;
            }
        }
        self.drive_next_locked().await;
        self.halted().unwrap_or(ExecStatus::Ok)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TaskEvent) {
        debug!(event = event.name(), label = ?event.label(), "Task event");
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        match requested {
            Some(after) if after.is_zero() => None,
            Some(after) => Some(after),
            None => self.shared.config.default_task_timeout(),
        }
    }

    /// Move the bot's output into the task's record.
    fn capture_output(&self, record: &RunRecord) {
        let agent = &self.shared.agent;
        record.append_output(&agent.capture_bot_logs());
        agent.clear_bot_logs();
    }

    /// The task's own result log comes first, then the summarized bot output.
    fn outcome(
        &self,
        id: TaskId,
        report: Report,
        record: &RunRecord,
        result_log: &str,
    ) -> TaskOutcome {
        let interrupted = record.interrupted();
        let timedout = record.timed_out();
        match report {
            Some(Err(failure)) if interrupted => {
                TaskOutcome::failed_after_stop(failure.message, timedout)
            }
            Some(Err(failure)) => TaskOutcome::fatal(ExecStatus::UncaughtError, failure.message),
            Some(Ok(())) | None => {
                let message = summarize_output(
                    &record.output(),
                    interrupted,
                    timedout,
                    self.shared.config.max_output_chars,
                );
                let message = match (result_log.is_empty(), message.is_empty()) {
                    (true, _) => message,
                    (false, true) => result_log.to_string(),
                    (false, false) => format!("{result_log}\n{message}"),
                };
                debug!(%id, interrupted, timedout, "Task outcome ready");
                TaskOutcome::completed(message, interrupted, timedout)
            }
        }
    }

    /// Start or resume the front task `id` and watch its completion.
    async fn begin_locked(&self, id: TaskId, phase: Phase) -> Result<(), ExecStatus> {
        let (task, label) = {
            let mut state = self.state();
            let Some(entry) = state.queue.front() else {
                return Ok(());
            };
            let begun = (entry.task.clone(), entry.label.clone());
            state.executing = true;
            begun
        };
        self.shared.agent.clear_bot_logs();

        let result = match phase {
            Phase::Start => {
                info!(label = %label, %id, "Starting task");
                self.emit(TaskEvent::Start {
                    label: label.clone(),
                });
                task.start().await
            }
            Phase::Resume => {
                info!(label = %label, %id, "Resuming task");
                self.emit(TaskEvent::Resume {
                    label: label.clone(),
                });
                task.resume().await
            }
        };

        if let Err(err) = result {
            error!(label = %label, error = %err, "Task could not be run");
            self.emit(TaskEvent::Error {
                label: label.clone(),
                error: err.to_string(),
            });
            return Err(self.escalate(
                ExecStatus::UncaughtError,
                &format!("Task {label} could not be run: {err}"),
            ));
        }

        self.watch(id, task.when_done());
        Ok(())
    }

    fn watch(&self, id: TaskId, done: TaskCompletion) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let result = done.wait().await;
            manager.on_settled(id, result).await;
        });
        match self.state().entry_mut(id) {
            Some(entry) => entry.watcher = Some(handle),
            None => handle.abort(),
        }
    }

    fn arm_timer(&self, id: TaskId, after: Duration) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            manager.on_timeout(id, after).await;
        });
        match self.state().entry_mut(id) {
            Some(entry) => entry.timer = Some(handle),
            None => handle.abort(),
        }
    }

    /// Stop protocol. Must be called with the scheduler lock held.
    async fn stop_locked(&self) -> ExecStatus {
        let (id, task, label, record, watcher) = {
            let mut state = self.state();
            if let Some(status) = state.halted {
                return status;
            }
            if !state.executing {
                return ExecStatus::Ok;
            }
            let Some(entry) = state.queue.front_mut() else {
                state.executing = false;
                return ExecStatus::Ok;
            };
            entry.record.interrupted.store(true, Ordering::SeqCst);
            (
                entry.id,
                entry.task.clone(),
                entry.label.clone(),
                entry.record.clone(),
                entry.watcher.take(),
            )
        };
        // Completion is handled here from now on, not by the watcher.
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        info!(label = %label, "Stopping task");
        let agent = self.shared.agent.clone();
        agent.interrupt_bot();

        let budget = self.shared.config.stop_timeout();
        let interval = self.shared.config.interrupt_interval();
        let deadline = tokio::time::sleep(budget);
        let mut nudge = tokio::time::interval_at(Instant::now() + interval, interval);
        let pause = task.pause();
        tokio::pin!(deadline, pause);

        let paused = loop {
            tokio::select! {
                biased;
                result = &mut pause => break Some(result),
                _ = &mut deadline => break None,
                _ = nudge.tick() => {
                    debug!(label = %label, "Task still running, interrupting again");
                    agent.interrupt_bot();
                }
            }
        };

        match paused {
            Some(Ok(())) => {
                self.state().executing = false;
                self.capture_output(&record);
                if let Some(result) = task.when_done().peek() {
                    // Finished for good; only the flush in drive_next is left.
                    self.disarm_timer(id);
                    self.publish(id, Some(result));
                }
                info!(label = %label, "Task paused");
                self.emit(TaskEvent::Pause { label });
                ExecStatus::GracefullyPaused
            }
            Some(Err(err)) => {
                error!(label = %label, error = %err, "Task failed to pause");
                self.emit(TaskEvent::Interrupt {
                    label: label.clone(),
                });
                self.escalate(
                    ExecStatus::UncaughtError,
                    &format!("Task {label} failed to pause: {err}"),
                )
            }
            None => {
                error!(
                    label = %label,
                    secs = budget.as_secs(),
                    "Task refused to stop, killing process"
                );
                self.emit(TaskEvent::Interrupt {
                    label: label.clone(),
                });
                self.escalate(
                    ExecStatus::FatalTimeout,
                    &format!(
                        "Code execution refused stop after {} seconds. Killing process.",
                        budget.as_secs()
                    ),
                )
            }
        }
    }

    fn disarm_timer(&self, id: TaskId) {
        let timer = self.state().entry_mut(id).and_then(|e| e.timer.take());
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    fn publish(&self, id: TaskId, report: Report) {
        if let Some(entry) = self.state().entry_mut(id) {
            entry.publish(report);
        }
    }

    /// Halt the manager and ask the agent to kill the process. Only the
    /// first escalation has any effect.
    fn escalate(&self, status: ExecStatus, reason: &str) -> ExecStatus {
        {
            let mut state = self.state();
            if let Some(existing) = state.halted {
                return existing;
            }
            state.halted = Some(status);
            state.executing = false;
        }
        error!(status = %status, reason, "Halting task manager");
        self.shared.halt.cancel();
        self.shared.agent.clean_kill(reason);
        status
    }

    async fn on_settled(&self, id: TaskId, result: Result<(), TaskFailure>) {
        let _sched = self.shared.sched.lock().await;
        let (entry, timer) = {
            let mut state = self.state();
            if state.halted.is_some() || !state.executing || !state.front_is(id) {
                return;
            }
            let Some(mut entry) = state.queue.pop_front() else {
                return;
            };
            state.executing = false;
            // This runs on the watcher task; detach rather than abort it.
            entry.watcher.take();
            let timer = entry.timer.take();
            (entry, timer)
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        self.capture_output(&entry.record);

        match result {
            Ok(()) => {
                info!(label = %entry.label, id = %entry.id, "Task finished");
                entry.publish(Some(Ok(())));
                self.emit(TaskEvent::End {
                    label: entry.label.clone(),
                });
                self.drive_next_locked().await;
            }
            Err(failure) => {
                error!(label = %entry.label, error = %failure, "Task failed");
                self.state().resume = None;
                entry.publish(Some(Err(failure.clone())));
                self.emit(TaskEvent::Error {
                    label: entry.label.clone(),
                    error: failure.message.clone(),
                });
                self.emit(TaskEvent::End {
                    label: entry.label.clone(),
                });
                self.escalate(
                    ExecStatus::UncaughtError,
                    &format!("Task {} threw: {failure}", entry.label),
                );
            }
        }
    }

    async fn on_timeout(&self, id: TaskId, after: Duration) {
        let _sched = self.shared.sched.lock().await;
        let (label, record, executing_front) = {
            let mut state = self.state();
            if state.halted.is_some() {
                return;
            }
            let executing_front = state.executing && state.front_is(id);
            let Some(entry) = state.entry_mut(id) else {
                return;
            };
            // This runs on the timer task; detach rather than abort it.
            entry.timer.take();
            if !executing_front && entry.task.when_done().is_settled() {
                return;
            }
            entry.record.timed_out.store(true, Ordering::SeqCst);
            (entry.label.clone(), entry.record.clone(), executing_front)
        };

        warn!(
            label = %label,
            mins = after.as_secs() / 60,
            "Task timed out, attempting force stop"
        );
        self.emit(TaskEvent::Timeout {
            label: label.clone(),
        });

        if executing_front && self.stop_locked().await.is_fatal() {
            return;
        }

        // A timed out task is never resumed.
        let Some(mut entry) = self.state().remove(id) else {
            return;
        };
        if let Some(watcher) = entry.watcher.take() {
            watcher.abort();
        }
        let result = entry.task.when_done().peek();
        if result.is_none() {
            // Paused work, e.g. held at a closed gate, would otherwise wait forever.
            entry.task.abort();
        }
        entry.publish(result);
        debug!(label = %label, interrupted = record.interrupted(), "Timed out task retired");
        self.emit(TaskEvent::End { label });

        if executing_front {
            self.drive_next_locked().await;
        }
    }

    /// Pick up the task now at the front of the queue. Queued tasks whose
    /// work already finished while paused are flushed without resuming.
    async fn drive_next_locked(&self) {
        loop {
            let next = {
                let mut state = self.state();
                if state.halted.is_some() {
                    return;
                }
                match state.queue.front() {
                    Some(entry) => Some((entry.id, entry.label.clone(), entry.task.when_done())),
                    None => {
                        state.executing = false;
                        None
                    }
                }
            };

            let Some((id, label, done)) = next else {
                info!("Task queue drained");
                self.emit(TaskEvent::Idle);
                return;
            };

            match done.peek() {
                Some(result) => {
                    let Some(mut entry) = self.state().remove(id) else {
                        continue;
                    };
                    if let Some(timer) = entry.timer.take() {
                        timer.abort();
                    }
                    if let Err(failure) = &result {
                        warn!(label = %label, error = %failure, "Paused task failed after being stopped");
                    }
                    entry.publish(Some(result));
                    self.emit(TaskEvent::End { label });
                }
                None => {
                    // A failed resume escalates inside begin_locked.
                    let _ = self.begin_locked(id, Phase::Resume).await;
                    return;
                }
            }
        }
    }
}
