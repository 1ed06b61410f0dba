//! Task execution for the agent.
//!
//! Tasks are units of bot work that can be:
//! - Started from scratch (all variants)
//! - Paused to make room for a newer task
//! - Resumed once the newer task is done ([`ResumableTask`], [`GatedTask`])
//!
//! The [`TaskManager`] keeps them on a stack so that at most one executes at
//! a time, and escalates to a process kill when a task will not stop.

mod display;
mod events;
mod gated;
mod goal;
mod manager;
mod model;
mod one_shot;
mod outcome;
mod resumable;

pub use display::{TaskIcon, format_event, format_outcome, format_snapshot};
pub use events::TaskEvent;
pub use gated::GatedTask;
pub use goal::{GOAL_LABEL, goal_task};
pub use manager::{ManagerSnapshot, QueuedTask, RunOptions, TaskManager};
pub use model::{ResultLog, Task, TaskCompletion, TaskId, TaskWork, WorkFactory};
pub use one_shot::OneShotTask;
pub use outcome::{ExecStatus, TaskOutcome, summarize_output};
pub use resumable::ResumableTask;
