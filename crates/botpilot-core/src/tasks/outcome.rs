use serde::Serialize;

/// Result of the manager's stop protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecStatus {
    /// Nothing needed stopping.
    Ok,
    /// The executing task paused within the stop timeout.
    GracefullyPaused,
    /// The executing task did not pause in time; the process is being killed.
    FatalTimeout,
    /// A task failed outside of a stop; the process is being killed.
    UncaughtError,
}

impl ExecStatus {
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::FatalTimeout | Self::UncaughtError)
    }
}

/// What a caller of `run_task` gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub status: ExecStatus,
    pub success: bool,
    /// The task's result log followed by a summary of the bot's output.
    pub message: Option<String>,
    pub error: Option<String>,
    pub interrupted: bool,
    pub timedout: bool,
}

impl TaskOutcome {
    pub(crate) fn completed(message: String, interrupted: bool, timedout: bool) -> Self {
        Self {
            status: ExecStatus::Ok,
            success: true,
            message: Some(message),
            error: None,
            interrupted,
            timedout,
        }
    }

    /// The task's work failed after the manager had already stopped it.
    pub(crate) fn failed_after_stop(error: String, timedout: bool) -> Self {
        Self {
            status: ExecStatus::Ok,
            success: false,
            message: None,
            error: Some(error),
            interrupted: true,
            timedout,
        }
    }

    /// The task was not run at all.
    pub(crate) fn skipped() -> Self {
        Self {
            status: ExecStatus::Ok,
            success: false,
            message: None,
            error: None,
            interrupted: false,
            timedout: false,
        }
    }

    pub(crate) fn fatal(status: ExecStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            message: None,
            error: Some(error.into()),
            interrupted: false,
            timedout: false,
        }
    }
}

/// Turn captured bot output into the message returned to the caller.
///
/// Output of a task that was interrupted for another one is dropped. Long
/// output keeps its head and tail.
pub fn summarize_output(output: &str, interrupted: bool, timedout: bool, max_chars: usize) -> String {
    if interrupted && !timedout {
        return String::new();
    }
    let len = output.chars().count();
    if len > max_chars {
        let half = max_chars / 2;
        let head: String = output.chars().take(half).collect();
        let tail: String = output.chars().skip(len - half).collect();
        format!(
            "Code output is very long ({len} chars) and has been shortened.\n\
             First outputs:\n{head}\n...skipping many lines.\nFinal outputs:\n{tail}"
        )
    } else {
        format!("Code output:\n{output}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_prefixed() {
        assert_eq!(
            summarize_output("Arrived at player.", false, false, 500),
            "Code output:\nArrived at player."
        );
    }

    #[test]
    fn interrupted_output_is_dropped_unless_timed_out() {
        assert_eq!(summarize_output("walking", true, false, 500), "");
        assert_eq!(
            summarize_output("walking", true, true, 500),
            "Code output:\nwalking"
        );
    }

    #[test]
    fn long_output_keeps_head_and_tail() {
        let output = format!("{}{}", "a".repeat(300), "b".repeat(300));
        let summary = summarize_output(&output, false, false, 500);
        assert!(summary.starts_with("Code output is very long (600 chars)"));
        assert!(summary.contains(&format!("First outputs:\n{}\n", "a".repeat(250))));
        assert!(summary.ends_with(&format!("Final outputs:\n{}", "b".repeat(250))));
        assert!(summary.contains("...skipping many lines."));
    }

    #[test]
    fn multibyte_output_is_split_on_char_boundaries() {
        let output = "é".repeat(20);
        let summary = summarize_output(&output, false, false, 10);
        assert!(summary.contains("(20 chars)"));
        assert!(summary.ends_with(&"é".repeat(5)));
    }

    #[test]
    fn status_display_and_fatality() {
        assert_eq!(ExecStatus::FatalTimeout.to_string(), "fatal_timeout");
        assert!(ExecStatus::UncaughtError.is_fatal());
        assert!(!ExecStatus::GracefullyPaused.is_fatal());
    }
}
