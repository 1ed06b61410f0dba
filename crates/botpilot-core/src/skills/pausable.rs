use async_trait::async_trait;

use super::{Capabilities, PauseControl, SkillArgs, SkillResult};
use crate::gate::Gate;

/// Capability set whose calls wait at a shared gate before running.
///
/// Pausing only holds back calls that have not started yet. A call that is
/// already past the gate keeps running; stopping that one is the job of the
/// bot's own interrupt.
pub struct Pausable<C> {
    inner: C,
    gate: Gate,
}

impl<C: Capabilities> Pausable<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            gate: Gate::new(),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Calls currently held at the gate.
    pub fn waiting(&self) -> usize {
        self.gate.waiting()
    }
}

impl<C: Capabilities> PauseControl for Pausable<C> {
    fn pause(&self) -> bool {
        self.gate.close()
    }

    fn resume(&self) -> bool {
        self.gate.open()
    }

    fn is_paused(&self) -> bool {
        !self.gate.is_open()
    }
}

#[async_trait]
impl<C: Capabilities> Capabilities for Pausable<C> {
    async fn call(&self, skill: &str, args: SkillArgs) -> SkillResult {
        self.gate.pass().await;
        self.inner.call(skill, args).await
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::test_support::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn paused_calls_wait_for_resume() {
        let bot = Arc::new(RecordingBot::default());
        let skills = Arc::new(Pausable::new(library().bind(bot.clone())));

        assert!(skills.pause());
        let pending = tokio::spawn({
            let skills = skills.clone();
            async move { skills.call("echo", json!(["a"])).await }
        });
        while skills.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(bot.calls().is_empty());

        assert!(skills.resume());
        assert_eq!(pending.await.unwrap().unwrap(), json!(["a"]));
        assert_eq!(bot.calls().len(), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let skills = Pausable::new(library().bind(Arc::new(RecordingBot::default())));

        assert!(!skills.resume());
        assert!(!skills.is_paused());

        assert!(skills.pause());
        assert!(!skills.pause());
        assert!(skills.is_paused());

        assert!(skills.resume());
        assert!(!skills.resume());
        skills.call("echo", json!([])).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_does_not_halt_calls_in_flight() {
        let bot = Arc::new(RecordingBot::default());
        let skills = Arc::new(Pausable::new(library().bind(bot.clone())));

        let running = tokio::spawn({
            let skills = skills.clone();
            async move { skills.call("slow", json!([500])).await }
        });
        while bot.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        skills.pause();
        assert_eq!(running.await.unwrap().unwrap(), json!(500));
    }
}
