use serde::Serialize;

/// Task lifecycle notification published by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum::IntoStaticStr)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was started from scratch.
    #[strum(serialize = "task:start")]
    Start { label: String },
    /// A task left the queue.
    #[strum(serialize = "task:end")]
    End { label: String },
    /// The executing task was paused to make room or on request.
    #[strum(serialize = "task:pause")]
    Pause { label: String },
    /// A paused task was picked up again.
    #[strum(serialize = "task:resume")]
    Resume { label: String },
    /// The executing task did not pause cleanly.
    #[strum(serialize = "task:interrupt")]
    Interrupt { label: String },
    #[strum(serialize = "task:error")]
    Error { label: String, error: String },
    #[strum(serialize = "task:timeout")]
    Timeout { label: String },
    /// The queue drained.
    #[strum(serialize = "idle")]
    Idle,
}

impl TaskEvent {
    /// Event name as published on the agent's event bus.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Label of the task the event is about; `None` for [`TaskEvent::Idle`].
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Start { label }
            | Self::End { label }
            | Self::Pause { label }
            | Self::Resume { label }
            | Self::Interrupt { label }
            | Self::Error { label, .. }
            | Self::Timeout { label } => Some(label),
            Self::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_labels() {
        let event = TaskEvent::Pause {
            label: "collectBlocks".into(),
        };
        assert_eq!(event.name(), "task:pause");
        assert_eq!(event.label(), Some("collectBlocks"));
        assert_eq!(TaskEvent::Idle.name(), "idle");
        assert_eq!(TaskEvent::Idle.label(), None);
    }

    #[test]
    fn serializes_with_tag() {
        let event = TaskEvent::Error {
            label: "craft".into(),
            error: "no table".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["label"], "craft");
        assert_eq!(json["error"], "no table");
    }
}
