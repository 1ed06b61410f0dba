use std::sync::Arc;

use super::resumable::ResumableTask;
use crate::agent::Agent;

/// Label of the task that pursues the agent's self-prompted goal.
pub const GOAL_LABEL: &str = "goal";

/// Resumable task that runs the agent's self-prompting loop on `prompt`.
///
/// Pausing stops the loop without waiting for the current iteration;
/// resuming starts it again from the same prompt.
pub fn goal_task(agent: &Arc<dyn Agent>, prompt: impl Into<String>) -> ResumableTask {
    let prompt = prompt.into();
    let prompter = agent.self_prompter();
    let runner = prompter.clone();
    ResumableTask::new(GOAL_LABEL, move || {
        let runner = runner.clone();
        let prompt = prompt.clone();
        async move { runner.start(prompt).await }
    })
    .on_pause(move || prompter.stop(false))
}
