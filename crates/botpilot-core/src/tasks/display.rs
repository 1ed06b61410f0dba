//! Icons and one-line formatting for task events, snapshots and outcomes.

use super::events::TaskEvent;
use super::manager::ManagerSnapshot;
use super::outcome::{ExecStatus, TaskOutcome};

/// Icon representation for a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskIcon {
    /// ▶️ Started
    Started,
    /// 🔄 Resumed
    Resumed,
    /// ⏸️ Paused
    Paused,
    /// ✅ Ended
    Ended,
    /// ⚠️ Interrupted without pausing
    Interrupted,
    /// ❌ Failed
    Failed,
    /// ⏰ Timed out
    TimedOut,
    /// 💤 Nothing left to run
    Idle,
}

impl TaskIcon {
    pub fn from_event(event: &TaskEvent) -> Self {
        match event {
            TaskEvent::Start { .. } => Self::Started,
            TaskEvent::Resume { .. } => Self::Resumed,
            TaskEvent::Pause { .. } => Self::Paused,
            TaskEvent::End { .. } => Self::Ended,
            TaskEvent::Interrupt { .. } => Self::Interrupted,
            TaskEvent::Error { .. } => Self::Failed,
            TaskEvent::Timeout { .. } => Self::TimedOut,
            TaskEvent::Idle => Self::Idle,
        }
    }

    /// Get emoji representation.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Started => "▶️",
            Self::Resumed => "🔄",
            Self::Paused => "⏸️",
            Self::Ended => "✅",
            Self::Interrupted => "⚠️",
            Self::Failed => "❌",
            Self::TimedOut => "⏰",
            Self::Idle => "💤",
        }
    }
}

impl std::fmt::Display for TaskIcon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.emoji())
    }
}

/// Format an event as a single line, e.g. `⏸️ task:pause collectBlocks`.
pub fn format_event(event: &TaskEvent) -> String {
    let icon = TaskIcon::from_event(event);
    match event {
        TaskEvent::Error { label, error } => format!("{} {} {}: {}", icon, event.name(), label, error),
        _ => match event.label() {
            Some(label) => format!("{} {} {}", icon, event.name(), label),
            None => format!("{} {}", icon, event.name()),
        },
    }
}

/// Format the queue as a status line, executing task first.
pub fn format_snapshot(snapshot: &ManagerSnapshot) -> String {
    if let Some(status) = snapshot.halted {
        return format!("halted ({})", status);
    }
    if snapshot.queue.is_empty() {
        return "idle".to_string();
    }

    let labels: Vec<String> = snapshot
        .queue
        .iter()
        .enumerate()
        .map(|(i, task)| {
            if i == 0 && snapshot.executing {
                format!("{} {}", TaskIcon::Started, task.label)
            } else {
                format!("{} {}", TaskIcon::Paused, task.label)
            }
        })
        .collect();
    labels.join(" ← ")
}

/// Format a task outcome for the command history.
pub fn format_outcome(label: &str, outcome: &TaskOutcome) -> String {
    if outcome.status != ExecStatus::Ok {
        let error = outcome.error.as_deref().unwrap_or("unknown error");
        return format!("{} {} ({}): {}", TaskIcon::Failed, label, outcome.status, error);
    }
    if !outcome.success {
        return match &outcome.error {
            Some(error) => format!("{} {}: stopped, then failed: {}", TaskIcon::Interrupted, label, error),
            None => format!("{} {}: not run", TaskIcon::Idle, label),
        };
    }

    let icon = if outcome.timedout {
        TaskIcon::TimedOut
    } else if outcome.interrupted {
        TaskIcon::Paused
    } else {
        TaskIcon::Ended
    };
    match outcome.message.as_deref() {
        Some(message) if !message.is_empty() => format!("{} {}: {}", icon, label, message),
        _ => format!("{} {}", icon, label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::manager::QueuedTask;
    use crate::tasks::model::TaskId;

    #[test]
    fn event_lines() {
        assert_eq!(
            format_event(&TaskEvent::Pause {
                label: "collectBlocks".into()
            }),
            "⏸️ task:pause collectBlocks"
        );
        assert_eq!(
            format_event(&TaskEvent::Error {
                label: "craft".into(),
                error: "no table".into()
            }),
            "❌ task:error craft: no table"
        );
        assert_eq!(format_event(&TaskEvent::Idle), "💤 idle");
    }

    #[test]
    fn snapshot_lines() {
        let mut snapshot = ManagerSnapshot {
            executing: true,
            halted: None,
            queue: vec![
                QueuedTask {
                    id: TaskId(2),
                    label: "goToPlayer".into(),
                },
                QueuedTask {
                    id: TaskId(1),
                    label: "collectBlocks".into(),
                },
            ],
            resume_label: None,
        };
        assert_eq!(format_snapshot(&snapshot), "▶️ goToPlayer ← ⏸️ collectBlocks");

        snapshot.halted = Some(ExecStatus::FatalTimeout);
        assert_eq!(format_snapshot(&snapshot), "halted (fatal_timeout)");

        snapshot.halted = None;
        snapshot.queue.clear();
        assert_eq!(format_snapshot(&snapshot), "idle");
    }

    #[test]
    fn outcome_lines() {
        let outcome = TaskOutcome::completed("Code output:\nArrived.".into(), false, false);
        assert_eq!(
            format_outcome("goToPlayer", &outcome),
            "✅ goToPlayer: Code output:\nArrived."
        );
        assert_eq!(
            format_outcome("walk", &TaskOutcome::skipped()),
            "💤 walk: not run"
        );
        let fatal = TaskOutcome::fatal(ExecStatus::UncaughtError, "boom");
        assert_eq!(
            format_outcome("walk", &fatal),
            "❌ walk (uncaught_error): boom"
        );
    }
}
