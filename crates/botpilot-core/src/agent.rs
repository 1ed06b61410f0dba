//! Agent collaborator contract.
//!
//! The task manager drives the game bot only through these traits. The
//! implementation lives with whoever owns the bot process; tests use
//! in-memory doubles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskFailure;

/// The agent that owns the game-bot handle.
pub trait Agent: Send + Sync {
    /// Ask the bot to abandon whatever it is doing as soon as it can.
    fn interrupt_bot(&self);

    /// Discard the bot's accumulated output log and reset its interrupt state.
    fn clear_bot_logs(&self);

    /// Return the bot's accumulated output log.
    fn capture_bot_logs(&self) -> String;

    /// Terminate the process. Called at most once by a task manager, after
    /// which the manager schedules nothing further.
    fn clean_kill(&self, reason: &str);

    /// Whether the bot is currently free for new work.
    fn is_idle(&self) -> bool;

    /// The agent's self-prompting loop.
    fn self_prompter(&self) -> Arc<dyn SelfPrompter>;
}

/// Self-prompting loop that keeps the agent working toward a goal.
#[async_trait]
pub trait SelfPrompter: Send + Sync {
    /// Whether a goal is currently being pursued.
    fn is_on(&self) -> bool;

    /// Turn the loop on for `prompt` and run it until it is stopped or the
    /// goal is reached.
    async fn start(&self, prompt: String) -> Result<(), TaskFailure>;

    /// Turn the loop off. A non-graceful stop abandons the current iteration.
    fn stop(&self, graceful: bool);
}
