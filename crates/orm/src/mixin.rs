//! Mixins: reusable schema and binding fragments
//!
//! A mixin is merged into a model at construction time, never
//! retroactively. Its position controls merge precedence: `Before` mixins
//! layer under the model's own declarations (the model wins schema
//! conflicts, mixin stage hooks run first); `After` mixins layer over
//! them (the mixin wins schema conflicts, its stage hooks run last).

use crate::field::Field;
use crate::lifecycle::{BindTable, LifecycleHook, MethodBindings, Stage, SubPipeline};
use crate::payload::Method;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixinPosition {
    Before,
    After,
}

/// A reusable schema/lifecycle fragment.
#[derive(Clone)]
pub struct Mixin {
    pub name: String,
    pub position: MixinPosition,
    pub schema: HashMap<String, Field>,
    pub bind: BindTable,
}

impl Mixin {
    pub fn new(name: impl Into<String>, position: MixinPosition) -> Self {
        Self {
            name: name.into(),
            position,
            schema: HashMap::new(),
            bind: HashMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.schema.insert(name.into(), field);
        self
    }

    pub fn bind(mut self, method: Method, stage: Stage, hook: LifecycleHook) -> Self {
        self.bind.entry(method).or_default().push(stage, hook);
        self
    }

    pub fn accept(mut self, method: Method, key: impl Into<String>, sub: SubPipeline) -> Self {
        let bindings = std::mem::take(self.bind.entry(method).or_default());
        self.bind.insert(method, bindings.accept(key, sub));
        self
    }

    pub fn reject(mut self, method: Method, key: impl Into<String>, sub: SubPipeline) -> Self {
        let bindings = std::mem::take(self.bind.entry(method).or_default());
        self.bind.insert(method, bindings.reject(key, sub));
        self
    }

    /// Replace the whole binding set for a method.
    pub fn bindings(mut self, method: Method, bindings: MethodBindings) -> Self {
        self.bind.insert(method, bindings);
        self
    }
}

impl fmt::Debug for Mixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixin")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("schema", &self.schema.keys().collect::<Vec<_>>())
            .field("bind", &self.bind.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Construct a mixin fragment.
pub fn mixin(name: impl Into<String>, position: MixinPosition) -> Mixin {
    Mixin::new(name, position)
}
