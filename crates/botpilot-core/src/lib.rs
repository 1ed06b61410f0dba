// ── botpilot Core Library ────────────────────────────────────────────────────
//
// Task execution engine for an LLM-driven game bot: a single-flight task
// queue with cooperative pause/resume, bounded stop with fatal escalation,
// gated skill capability sets, and the agent collaborator contracts that
// the engine drives.

pub mod agent;
pub mod config;
pub mod deferred;
pub mod error;
pub mod gate;
pub mod logging;
pub mod skills;
pub mod tasks;

pub use agent::{Agent, SelfPrompter};
pub use config::Config;
pub use deferred::{Completion, Resolver, deferred};
pub use error::{ConfigError, SkillError, TaskError, TaskFailure};
pub use gate::Gate;
pub use tasks::{ExecStatus, RunOptions, Task, TaskEvent, TaskManager, TaskOutcome};
