use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Capabilities, PauseControl, Pausable, SkillArgs, SkillResult};

/// A call that has been issued but has not finished.
#[derive(Debug, Clone, PartialEq)]
pub struct InflightCall {
    pub id: u64,
    pub skill: String,
    pub args: SkillArgs,
}

/// Capability set that records every call until it finishes.
pub struct InflightTracked<C> {
    inner: C,
    inflight: Mutex<Vec<InflightCall>>,
    next_id: AtomicU64,
}

impl<C: Capabilities> InflightTracked<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            inflight: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<InflightCall>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the calls that have not finished yet, oldest first.
    pub fn inflight(&self) -> Vec<InflightCall> {
        self.entries().clone()
    }

    /// Issue every in-flight call again as a new, detached invocation.
    ///
    /// The original callers keep waiting on their own invocations; results of
    /// the resubmitted ones are dropped, failures are logged. Skills must be
    /// safe to run more than once with the same arguments.
    pub fn resubmit(self: &Arc<Self>) -> usize
    where
        C: 'static,
    {
        let pending = self.inflight();
        for call in &pending {
            let this = self.clone();
            let call = call.clone();
            tokio::spawn(async move {
                if let Err(err) = this.call(&call.skill, call.args).await {
                    warn!(skill = %call.skill, error = %err, "Resubmitted skill call failed");
                }
            });
        }
        pending.len()
    }
}

#[async_trait]
impl<C: Capabilities> Capabilities for InflightTracked<C> {
    async fn call(&self, skill: &str, args: SkillArgs) -> SkillResult {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries().push(InflightCall {
            id,
            skill: skill.to_string(),
            args: args.clone(),
        });
        let _entry = InflightEntry { owner: &self.inflight, id };
        self.inner.call(skill, args).await
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

/// Removes the call record when the call finishes or is dropped.
struct InflightEntry<'a> {
    owner: &'a Mutex<Vec<InflightCall>>,
    id: u64,
}

impl Drop for InflightEntry<'_> {
    fn drop(&mut self) {
        let mut entries = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|call| call.id != self.id);
    }
}

/// Pausable capability set that resubmits abandoned calls on resume.
///
/// Calls pass the gate first and are tracked only once they proceed, so the
/// in-flight set holds exactly the calls that were already running when the
/// gate closed.
pub struct Restartable<C> {
    tracked: Arc<InflightTracked<C>>,
    gated: Pausable<Arc<InflightTracked<C>>>,
}

impl<C: Capabilities + 'static> Restartable<C> {
    pub fn new(inner: C) -> Self {
        let tracked = Arc::new(InflightTracked::new(inner));
        Self {
            gated: Pausable::new(tracked.clone()),
            tracked,
        }
    }

    pub fn inflight(&self) -> Vec<InflightCall> {
        self.tracked.inflight()
    }

    pub fn waiting(&self) -> usize {
        self.gated.waiting()
    }
}

impl<C: Capabilities + 'static> PauseControl for Restartable<C> {
    fn pause(&self) -> bool {
        self.gated.pause()
    }

    /// Resubmit in-flight calls, then open the gate.
    fn resume(&self) -> bool {
        if !self.gated.is_paused() {
            return false;
        }
        let resubmitted = self.tracked.resubmit();
        if resubmitted > 0 {
            debug!(count = resubmitted, "Resubmitted in-flight skill calls");
        }
        self.gated.resume()
    }

    fn is_paused(&self) -> bool {
        self.gated.is_paused()
    }
}

#[async_trait]
impl<C: Capabilities + 'static> Capabilities for Restartable<C> {
    async fn call(&self, skill: &str, args: SkillArgs) -> SkillResult {
        self.gated.call(skill, args).await
    }

    fn names(&self) -> Vec<String> {
        self.gated.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::test_support::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn tracks_calls_until_they_finish() {
        let bot = Arc::new(RecordingBot::default());
        let skills = Arc::new(InflightTracked::new(library().bind(bot.clone())));

        let running = tokio::spawn({
            let skills = skills.clone();
            async move { skills.call("slow", json!([100])).await }
        });
        while bot.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        let inflight = skills.inflight();
        assert_eq!(inflight.len(), 1);
        assert_eq!(inflight[0].skill, "slow");
        assert_eq!(inflight[0].args, json!([100]));

        running.await.unwrap().unwrap();
        assert!(skills.inflight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_is_untracked() {
        let skills = Arc::new(InflightTracked::new(
            library().bind(Arc::new(RecordingBot::default())),
        ));
        let running = tokio::spawn({
            let skills = skills.clone();
            async move { skills.call("slow", json!([10_000])).await }
        });
        while skills.inflight().is_empty() {
            tokio::task::yield_now().await;
        }
        running.abort();
        let _ = running.await;
        assert!(skills.inflight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_resubmits_abandoned_calls() {
        let bot = Arc::new(RecordingBot::default());
        let skills = Arc::new(Restartable::new(library().bind(bot.clone())));

        let _running = tokio::spawn({
            let skills = skills.clone();
            async move { skills.call("slow", json!([1_000])).await }
        });
        while bot.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(skills.pause());
        assert_eq!(skills.inflight().len(), 1);
        assert!(skills.resume());

        while bot.calls().len() < 2 {
            tokio::task::yield_now().await;
        }
        let calls = bot.calls();
        assert_eq!(calls[1], ("slow".to_string(), json!([1_000])));
    }

    #[tokio::test]
    async fn resume_without_pause_resubmits_nothing() {
        let bot = Arc::new(RecordingBot::default());
        let skills = Restartable::new(library().bind(bot.clone()));
        assert!(!skills.resume());
        tokio::task::yield_now().await;
        assert!(bot.calls().is_empty());
    }
}
