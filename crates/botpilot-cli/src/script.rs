//! Scripted command schedules.
//!
//! ```toml
//! [[command]]
//! at_ms = 0
//! action = "run"
//! label = "collectBlocks"
//! steps = 20
//!
//! [[command]]
//! at_ms = 2500
//! action = "run"
//! label = "goToPlayer"
//! steps = 2
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    #[serde(default, rename = "command")]
    pub commands: Vec<ScheduledCommand>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduledCommand {
    /// Offset from the start of the replay.
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// One-shot walk through the bot's skills.
    Run(WalkSpec),
    /// Walk whose skill calls are paused at a gate and resubmitted on resume.
    Gated(WalkSpec),
    /// Self-prompted goal.
    Goal {
        prompt: String,
        #[serde(default = "default_turns")]
        turns: u32,
    },
    Stop,
    Start,
    Resume,
    CancelResume,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WalkSpec {
    pub label: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    pub timeout_mins: Option<u64>,
    /// Remember the task for `resume`.
    #[serde(default)]
    pub resume: bool,
    /// Fail with this message after the last step.
    pub fail: Option<String>,
    /// Keep walking through interrupts.
    #[serde(default)]
    pub stubborn: bool,
}

fn default_steps() -> u32 {
    5
}

fn default_step_ms() -> u64 {
    500
}

fn default_turns() -> u32 {
    3
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid script {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut script: Script = toml::from_str(content)?;
        script.commands.sort_by_key(|c| c.at_ms);
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_orders_commands() {
        let script = Script::parse(
            r#"
            [[command]]
            at_ms = 3000
            action = "stop"

            [[command]]
            at_ms = 0
            action = "run"
            label = "collectBlocks"
            steps = 20
            resume = true

            [[command]]
            at_ms = 1000
            action = "goal"
            prompt = "build a house"
            "#,
        )
        .unwrap();

        assert_eq!(script.commands.len(), 3);
        assert_eq!(script.commands[0].at_ms, 0);
        match &script.commands[0].action {
            Action::Run(spec) => {
                assert_eq!(spec.label, "collectBlocks");
                assert_eq!(spec.steps, 20);
                assert_eq!(spec.step_ms, 500);
                assert!(spec.resume);
                assert!(!spec.stubborn);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(
            script.commands[1].action,
            Action::Goal {
                prompt: "build a house".into(),
                turns: 3
            }
        );
        assert_eq!(script.commands[2].action, Action::Stop);
    }

    #[test]
    fn bundled_scripts_parse() {
        for content in [
            include_str!("../scripts/preempt.toml"),
            include_str!("../scripts/timeout.toml"),
            include_str!("../scripts/stuck.toml"),
        ] {
            let script = Script::parse(content).unwrap();
            assert!(!script.commands.is_empty());
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(Script::parse("[[command]]\naction = \"fly\"\n").is_err());
    }
}
