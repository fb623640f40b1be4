//! Lifecycle hook machinery
//!
//! A [`LifecycleFunction`] is one ordered step of the dispatch pipeline.
//! Hooks run sequentially in binding order because later hooks may read
//! state an earlier hook produced. Returning `Ok(false)` aborts the
//! pipeline; returning an error aborts with that error.

use crate::error::OrmResult;
use crate::payload::{Method, Payload};
use crate::state::State;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Mutable context handed to every hook: the payload being dispatched and
/// the per-run state (metrics, todo queue).
#[derive(Debug)]
pub struct Context {
    pub payload: Payload,
    pub state: State,
}

impl Context {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            state: State::new(),
        }
    }

    /// Body as a mutable JSON object map, if the payload carries one.
    pub fn body_object_mut(&mut self) -> Option<&mut serde_json::Map<String, serde_json::Value>> {
        self.payload.body.as_mut().and_then(|b| b.as_object_mut())
    }
}

/// `Ok(true)` continues the pipeline, `Ok(false)` aborts it.
pub type LifecycleResult = OrmResult<bool>;

/// One lifecycle pipeline step. Implement this directly for async hooks;
/// wrap a plain closure with [`hook`] for the common synchronous case.
#[async_trait]
pub trait LifecycleFunction: Send + Sync {
    async fn call(&self, cx: &mut Context) -> LifecycleResult;
}

/// Shared handle to a lifecycle hook, cheap to clone into stage lists.
pub type LifecycleHook = Arc<dyn LifecycleFunction>;

struct SyncHook<F>(F);

#[async_trait]
impl<F> LifecycleFunction for SyncHook<F>
where
    F: Fn(&mut Context) -> LifecycleResult + Send + Sync,
{
    async fn call(&self, cx: &mut Context) -> LifecycleResult {
        (self.0)(cx)
    }
}

/// Adapt a synchronous closure into a [`LifecycleHook`].
pub fn hook<F>(f: F) -> LifecycleHook
where
    F: Fn(&mut Context) -> LifecycleResult + Send + Sync + 'static,
{
    Arc::new(SyncHook(f))
}

/// Convenience hook that always passes; useful as an explicit `everybody`
/// role binding.
pub fn everybody() -> LifecycleHook {
    hook(|_| Ok(true))
}

/// The fixed, ordered lifecycle stages of one dispatched method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PreRule,
    Modify,
    Role,
    Rule,
    Filter,
    Effect,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::PreRule => "preRule",
            Stage::Modify => "modify",
            Stage::Role => "role",
            Stage::Rule => "rule",
            Stage::Filter => "filter",
            Stage::Effect => "effect",
        }
    }
}

/// Conditional sub-pipeline under an `accept` or `reject` key.
#[derive(Clone, Default)]
pub struct SubPipeline {
    pub modify: Vec<LifecycleHook>,
    pub rule: Vec<LifecycleHook>,
}

impl SubPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modify(mut self, hook: LifecycleHook) -> Self {
        self.modify.push(hook);
        self
    }

    pub fn rule(mut self, hook: LifecycleHook) -> Self {
        self.rule.push(hook);
        self
    }

    fn append(&mut self, other: &SubPipeline) {
        self.modify.extend(other.modify.iter().cloned());
        self.rule.extend(other.rule.iter().cloned());
    }
}

impl fmt::Debug for SubPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubPipeline")
            .field("modify", &self.modify.len())
            .field("rule", &self.rule.len())
            .finish()
    }
}

/// Ordered stage lists bound to one method, plus the accept/reject
/// sub-pipeline maps keyed by a field's resolved value.
#[derive(Clone, Default)]
pub struct MethodBindings {
    pub pre_rule: Vec<LifecycleHook>,
    pub modify: Vec<LifecycleHook>,
    pub role: Vec<LifecycleHook>,
    pub rule: Vec<LifecycleHook>,
    pub filter: Vec<LifecycleHook>,
    pub effect: Vec<LifecycleHook>,
    pub accept: HashMap<String, SubPipeline>,
    pub reject: HashMap<String, SubPipeline>,
}

impl MethodBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, stage: Stage) -> &[LifecycleHook] {
        match stage {
            Stage::PreRule => &self.pre_rule,
            Stage::Modify => &self.modify,
            Stage::Role => &self.role,
            Stage::Rule => &self.rule,
            Stage::Filter => &self.filter,
            Stage::Effect => &self.effect,
        }
    }

    pub fn push(&mut self, stage: Stage, hook: LifecycleHook) {
        match stage {
            Stage::PreRule => self.pre_rule.push(hook),
            Stage::Modify => self.modify.push(hook),
            Stage::Role => self.role.push(hook),
            Stage::Rule => self.rule.push(hook),
            Stage::Filter => self.filter.push(hook),
            Stage::Effect => self.effect.push(hook),
        }
    }

    /// Chainable form of [`push`](Self::push) for builder-style setup.
    pub fn on(mut self, stage: Stage, hook: LifecycleHook) -> Self {
        self.push(stage, hook);
        self
    }

    pub fn accept(mut self, key: impl Into<String>, sub: SubPipeline) -> Self {
        self.accept.entry(key.into()).or_default().append(&sub);
        self
    }

    pub fn reject(mut self, key: impl Into<String>, sub: SubPipeline) -> Self {
        self.reject.entry(key.into()).or_default().append(&sub);
        self
    }

    /// Concatenate another binding set after this one. Stage lists never
    /// overwrite; they extend in application order. Sub-pipelines under
    /// the same key concatenate the same way.
    pub fn append(&mut self, other: &MethodBindings) {
        self.pre_rule.extend(other.pre_rule.iter().cloned());
        self.modify.extend(other.modify.iter().cloned());
        self.role.extend(other.role.iter().cloned());
        self.rule.extend(other.rule.iter().cloned());
        self.filter.extend(other.filter.iter().cloned());
        self.effect.extend(other.effect.iter().cloned());
        for (key, sub) in &other.accept {
            self.accept.entry(key.clone()).or_default().append(sub);
        }
        for (key, sub) in &other.reject {
            self.reject.entry(key.clone()).or_default().append(sub);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre_rule.is_empty()
            && self.modify.is_empty()
            && self.role.is_empty()
            && self.rule.is_empty()
            && self.filter.is_empty()
            && self.effect.is_empty()
            && self.accept.is_empty()
            && self.reject.is_empty()
    }
}

// Hook lists hold trait objects, so Debug shows counts per stage.
impl fmt::Debug for MethodBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBindings")
            .field("preRule", &self.pre_rule.len())
            .field("modify", &self.modify.len())
            .field("role", &self.role.len())
            .field("rule", &self.rule.len())
            .field("filter", &self.filter.len())
            .field("effect", &self.effect.len())
            .field("accept", &self.accept.keys().collect::<Vec<_>>())
            .field("reject", &self.reject.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Bind table for a whole model: one [`MethodBindings`] per exposed method.
pub type BindTable = HashMap<Method, MethodBindings>;
