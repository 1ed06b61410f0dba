//! Skill capability sets.
//!
//! A skill is a named asynchronous operation against the game bot (movement,
//! crafting, inventory, ...). The skills themselves live outside this crate;
//! here they are collected into a [`SkillLibrary`], bound to a bot handle,
//! and exposed through the [`Capabilities`] trait so they can be wrapped:
//!
//! - [`Pausable`] routes every call through a [`Gate`](crate::gate::Gate)
//! - [`InflightTracked`] records calls that have not finished yet
//! - [`Restartable`] combines both and resubmits abandoned calls on resume

mod pausable;
mod tracked;

pub use pausable::Pausable;
pub use tracked::{InflightCall, InflightTracked, Restartable};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SkillError;

/// Arguments passed to a skill, usually a JSON array of positional values.
pub type SkillArgs = serde_json::Value;

/// Result of a skill invocation.
pub type SkillResult = Result<serde_json::Value, SkillError>;

/// A single operation from the external skill library.
#[async_trait]
pub trait Skill<B>: Send + Sync {
    async fn invoke(&self, bot: Arc<B>, args: SkillArgs) -> SkillResult;
}

struct FnSkill<F>(F);

#[async_trait]
impl<B, F, Fut> Skill<B> for FnSkill<F>
where
    B: Send + Sync + 'static,
    F: Fn(Arc<B>, SkillArgs) -> Fut + Send + Sync,
    Fut: Future<Output = SkillResult> + Send,
{
    async fn invoke(&self, bot: Arc<B>, args: SkillArgs) -> SkillResult {
        (self.0)(bot, args).await
    }
}

/// Named collection of skills for bots of type `B`.
pub struct SkillLibrary<B> {
    skills: BTreeMap<String, Arc<dyn Skill<B>>>,
}

impl<B: Send + Sync + 'static> SkillLibrary<B> {
    pub fn new() -> Self {
        Self {
            skills: BTreeMap::new(),
        }
    }

    /// Register a skill, replacing any previous skill with the same name.
    pub fn register(&mut self, name: impl Into<String>, skill: impl Skill<B> + 'static) {
        self.skills.insert(name.into(), Arc::new(skill));
    }

    /// Register a closure as a skill.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Arc<B>, SkillArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SkillResult> + Send + 'static,
    {
        self.register(name, FnSkill(f));
    }

    /// Builder form of [`register_fn`](Self::register_fn).
    pub fn with_fn<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<B>, SkillArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SkillResult> + Send + 'static,
    {
        self.register_fn(name, f);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill<B>>> {
        self.skills.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Bind the library to a bot handle, producing a callable capability set.
    pub fn bind(self: &Arc<Self>, bot: Arc<B>) -> BoundSkills<B> {
        BoundSkills {
            library: self.clone(),
            bot,
        }
    }
}

impl<B: Send + Sync + 'static> Default for SkillLibrary<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of named asynchronous operations that can be called by name.
#[async_trait]
pub trait Capabilities: Send + Sync {
    async fn call(&self, skill: &str, args: SkillArgs) -> SkillResult;

    fn names(&self) -> Vec<String>;
}

#[async_trait]
impl<C: Capabilities + ?Sized> Capabilities for Arc<C> {
    async fn call(&self, skill: &str, args: SkillArgs) -> SkillResult {
        (**self).call(skill, args).await
    }

    fn names(&self) -> Vec<String> {
        (**self).names()
    }
}

/// Pause/resume control over a wrapped capability set.
pub trait PauseControl: Send + Sync {
    /// Stop new calls from proceeding. Returns `false` if already paused.
    fn pause(&self) -> bool;

    /// Let calls proceed again. Returns `false` if not paused.
    fn resume(&self) -> bool;

    fn is_paused(&self) -> bool;
}

impl<P: PauseControl + ?Sized> PauseControl for Arc<P> {
    fn pause(&self) -> bool {
        (**self).pause()
    }

    fn resume(&self) -> bool {
        (**self).resume()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }
}

/// A skill library bound to one bot handle.
pub struct BoundSkills<B> {
    library: Arc<SkillLibrary<B>>,
    bot: Arc<B>,
}

impl<B> Clone for BoundSkills<B> {
    fn clone(&self) -> Self {
        Self {
            library: self.library.clone(),
            bot: self.bot.clone(),
        }
    }
}

impl<B> BoundSkills<B> {
    pub fn bot(&self) -> &Arc<B> {
        &self.bot
    }
}

#[async_trait]
impl<B: Send + Sync + 'static> Capabilities for BoundSkills<B> {
    async fn call(&self, skill: &str, args: SkillArgs) -> SkillResult {
        let Some(op) = self.library.get(skill) else {
            return Err(SkillError::Unknown(skill.to_string()));
        };
        op.invoke(self.bot.clone(), args).await
    }

    fn names(&self) -> Vec<String> {
        self.library.names()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Minimal bot that records every skill call it receives.
    #[derive(Default)]
    pub struct RecordingBot {
        pub calls: Mutex<Vec<(String, SkillArgs)>>,
    }

    impl RecordingBot {
        pub fn calls(&self) -> Vec<(String, SkillArgs)> {
            self.calls.lock().unwrap().clone()
        }
    }

    /// `echo` returns its args, `slow` sleeps for `args[0]` milliseconds.
    pub fn library() -> Arc<SkillLibrary<RecordingBot>> {
        let lib = SkillLibrary::new()
            .with_fn("echo", |bot: Arc<RecordingBot>, args| async move {
                bot.calls.lock().unwrap().push(("echo".into(), args.clone()));
                Ok::<_, SkillError>(args)
            })
            .with_fn("slow", |bot: Arc<RecordingBot>, args: SkillArgs| async move {
                bot.calls.lock().unwrap().push(("slow".into(), args.clone()));
                let ms = args.get(0).and_then(|v| v.as_u64()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, SkillError>(serde_json::json!(ms))
            });
        Arc::new(lib)
    }
}
