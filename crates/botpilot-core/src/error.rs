//! Error types shared across the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single skill invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkillError {
    /// No skill with this name is registered in the capability set.
    #[error("unknown skill `{0}`")]
    Unknown(String),

    /// The bot was interrupted while the skill was running.
    #[error("skill interrupted")]
    Interrupted,

    /// Domain error raised by the skill itself.
    #[error("{0}")]
    Failed(String),
}

/// Failure carried by a task's completion future.
///
/// Cloneable so every waiter on the same completion observes the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskFailure {
    pub message: String,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<SkillError> for TaskFailure {
    fn from(err: SkillError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for TaskFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TaskFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors raised by the operations of the task contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// `resume()` was called on a task variant that cannot resume.
    #[error("task `{label}` cannot be resumed")]
    NotResumable { label: String },

    /// `start()` was called a second time on a one-shot task.
    #[error("task `{label}` was already started")]
    AlreadyStarted { label: String },

    /// The task's pause hook failed.
    #[error("task `{label}` failed to pause: {reason}")]
    PauseFailed { label: String, reason: String },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_errors_convert_to_failures() {
        let failure: TaskFailure = SkillError::Unknown("fly".into()).into();
        assert_eq!(failure.message, "unknown skill `fly`");

        let failure: TaskFailure = SkillError::Failed("no path to player".into()).into();
        assert_eq!(failure.to_string(), "no path to player");
    }

    #[test]
    fn not_resumable_names_the_task() {
        let err = TaskError::NotResumable {
            label: "goToPlayer".into(),
        };
        assert_eq!(err.to_string(), "task `goToPlayer` cannot be resumed");
    }
}
