//! In-process stand-in for a game bot.
//!
//! The bot walks along a line one step per skill call. Its output log and
//! interrupt flag behave like a real bot's, which is all the task manager
//! needs to exercise preemption, timeouts and escalation.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use botpilot_core::skills::{Capabilities, SkillArgs, SkillLibrary};
use botpilot_core::{Agent, SelfPrompter, SkillError, TaskFailure};
use serde_json::json;
use tracing::{error, info};

use crate::script::WalkSpec;

#[derive(Default)]
pub struct SimBot {
    output: Mutex<Vec<String>>,
    interrupted: AtomicBool,
    position: AtomicI64,
    active: AtomicUsize,
    prompter: Arc<SimPrompter>,
}

impl SimBot {
    pub fn new() -> Arc<Self> {
        let bot = Arc::new(Self::default());
        bot.prompter.attach(&bot);
        bot
    }

    pub fn log(&self, line: impl Into<String>) {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn prompter(&self) -> &SimPrompter {
        &self.prompter
    }
}

impl Agent for SimBot {
    fn interrupt_bot(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn clear_bot_logs(&self) {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.interrupted.store(false, Ordering::SeqCst);
    }

    fn capture_bot_logs(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .join("\n")
    }

    fn clean_kill(&self, reason: &str) {
        error!(reason, "Killing bot process");
        std::process::exit(1);
    }

    fn is_idle(&self) -> bool {
        self.active.load(Ordering::SeqCst) == 0
    }

    fn self_prompter(&self) -> Arc<dyn SelfPrompter> {
        self.prompter.clone()
    }
}

/// The bot's skills: `step` moves one unit, `stall` ignores interrupts.
pub fn skills() -> Arc<SkillLibrary<SimBot>> {
    let library = SkillLibrary::new()
        .with_fn("step", |bot: Arc<SimBot>, args: SkillArgs| async move {
            if bot.is_interrupted() {
                return Err(SkillError::Interrupted);
            }
            tokio::time::sleep(step_duration(&args)).await;
            let position = bot.position.fetch_add(1, Ordering::SeqCst) + 1;
            bot.log(format!("Moved to x={position}."));
            Ok(json!(position))
        })
        .with_fn("stall", |bot: Arc<SimBot>, args: SkillArgs| async move {
            tokio::time::sleep(step_duration(&args)).await;
            bot.log("Still stuck.");
            Ok::<_, SkillError>(json!(null))
        });
    Arc::new(library)
}

fn step_duration(args: &SkillArgs) -> Duration {
    Duration::from_millis(args.get(0).and_then(|v| v.as_u64()).unwrap_or(500))
}

/// Walk `spec.steps` steps through any capability set.
pub async fn walk<C: Capabilities>(
    bot: Arc<SimBot>,
    skills: C,
    spec: WalkSpec,
) -> Result<(), TaskFailure> {
    bot.active.fetch_add(1, Ordering::SeqCst);
    let result = walk_steps(&bot, &skills, &spec).await;
    bot.active.fetch_sub(1, Ordering::SeqCst);
    result
}

async fn walk_steps<C: Capabilities>(
    bot: &SimBot,
    skills: &C,
    spec: &WalkSpec,
) -> Result<(), TaskFailure> {
    let skill = if spec.stubborn { "stall" } else { "step" };
    for _ in 0..spec.steps {
        match skills.call(skill, json!([spec.step_ms])).await {
            Ok(_) => {}
            Err(SkillError::Interrupted) => {
                bot.log("Interrupted.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }
    match &spec.fail {
        Some(reason) => Err(TaskFailure::new(reason.clone())),
        None => Ok(()),
    }
}

/// Self-prompting loop that takes a fixed number of turns toward its goal.
#[derive(Default)]
pub struct SimPrompter {
    on: AtomicBool,
    turns: AtomicUsize,
    /// Weak so the bot, which owns the prompter, can be dropped.
    bot: Mutex<Weak<SimBot>>,
}

impl SimPrompter {
    fn attach(&self, bot: &Arc<SimBot>) {
        *self.bot.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(bot);
    }

    pub fn set_turns(&self, turns: u32) {
        self.turns.store(turns as usize, Ordering::SeqCst);
    }
}

#[async_trait]
impl SelfPrompter for SimPrompter {
    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    async fn start(&self, prompt: String) -> Result<(), TaskFailure> {
        let bot = self
            .bot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
            .ok_or_else(|| TaskFailure::new("self-prompter has no bot"))?;
        let skills = skills().bind(bot);
        self.on.store(true, Ordering::SeqCst);
        info!(%prompt, "Self-prompting");
        while self.is_on() {
            if self.turns.load(Ordering::SeqCst) == 0 {
                skills.bot().log(format!("Goal reached: {prompt}."));
                self.on.store(false, Ordering::SeqCst);
                break;
            }
            match skills.call("step", json!([1000])).await {
                Ok(_) => {
                    self.turns.fetch_sub(1, Ordering::SeqCst);
                }
                Err(SkillError::Interrupted) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn stop(&self, _graceful: bool) {
        self.on.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(steps: u32) -> WalkSpec {
        WalkSpec {
            label: "walk".into(),
            steps,
            step_ms: 100,
            timeout_mins: None,
            resume: false,
            fail: None,
            stubborn: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn walk_moves_the_bot() {
        let bot = SimBot::new();
        walk(bot.clone(), skills().bind(bot.clone()), spec(3))
            .await
            .unwrap();
        assert_eq!(bot.position(), 3);
        assert!(bot.capture_bot_logs().ends_with("Moved to x=3."));
        assert!(bot.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_walk_stops_early() {
        let bot = SimBot::new();
        bot.interrupt_bot();
        walk(bot.clone(), skills().bind(bot.clone()), spec(3))
            .await
            .unwrap();
        assert_eq!(bot.position(), 0);
        assert_eq!(bot.capture_bot_logs(), "Interrupted.");
    }

    #[tokio::test(start_paused = true)]
    async fn prompter_reaches_goal_after_its_turns() {
        let bot = SimBot::new();
        let prompter = bot.self_prompter();
        bot.prompter.set_turns(2);
        prompter.start("build a house".into()).await.unwrap();
        assert!(!prompter.is_on());
        assert_eq!(bot.position(), 2);
        assert!(bot.capture_bot_logs().ends_with("Goal reached: build a house."));
    }

    #[test]
    fn bot_and_prompter_are_freed_together() {
        let bot = SimBot::new();
        let prompter = Arc::downgrade(&bot.prompter);
        let weak_bot = Arc::downgrade(&bot);
        drop(bot);
        assert!(weak_bot.upgrade().is_none());
        assert!(prompter.upgrade().is_none());
    }
}
