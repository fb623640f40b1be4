//! Field descriptors
//!
//! A [`Field`] is one named, typed attribute of a model: a validator plus
//! constraint, visibility, relation and reactive metadata, built with a
//! chainable builder.

use crate::lifecycle::LifecycleHook;
use crate::model::Model;
use fookie_validation::Validator;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Recomputes a derived value from a source value.
pub type ComputeFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Picks a value for a field at create time when neither the body nor
/// `default` supplies one. Receives the resolved model and the field name.
pub type SelectionFn = Arc<dyn Fn(&Model, &str) -> Value + Send + Sync>;

/// A declarative derived-field edge: when `from` changes in a body, `to`
/// is recomputed via `compute`.
#[derive(Clone)]
pub struct Reactive {
    pub from: String,
    pub to: String,
    pub compute: ComputeFn,
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// A typed, constrained attribute of a model.
#[derive(Clone)]
pub struct Field {
    /// The value validator this field references.
    pub kind: Validator,
    pub required: bool,
    pub unique: bool,
    pub default: Option<Value>,
    /// Other field names forming a composite unique key with this one.
    pub unique_group: Vec<String>,
    /// Accepted in bodies (hooks may read it) but never persisted.
    pub only_client: bool,
    /// Persisted but redacted from every response.
    pub only_server: bool,
    /// Non-owning reference to another model, by name.
    pub relation: Option<String>,
    /// Per-field hooks run after retrieval, before the response.
    pub read: Vec<LifecycleHook>,
    /// Per-field hooks run before persisting the value.
    pub write: Vec<LifecycleHook>,
    /// Delete referencing rows when the related row is deleted.
    pub cascade_delete: bool,
    /// Null out this field when the related row is deleted.
    pub reactive_delete: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Length bounds for strings and arrays.
    pub minimum_size: Option<usize>,
    pub maximum_size: Option<usize>,
    pub selection: Option<SelectionFn>,
    pub reactives: Vec<Reactive>,
}

impl Field {
    pub fn new(kind: Validator) -> Self {
        Self {
            kind,
            required: false,
            unique: false,
            default: None,
            unique_group: Vec::new(),
            only_client: false,
            only_server: false,
            relation: None,
            read: Vec::new(),
            write: Vec::new(),
            cascade_delete: false,
            reactive_delete: false,
            minimum: None,
            maximum: None,
            minimum_size: None,
            maximum_size: None,
            selection: None,
            reactives: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn unique_group(mut self, fields: &[&str]) -> Self {
        self.unique_group = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn only_client(mut self) -> Self {
        self.only_client = true;
        self
    }

    pub fn only_server(mut self) -> Self {
        self.only_server = true;
        self
    }

    pub fn relation(mut self, model: impl Into<String>) -> Self {
        self.relation = Some(model.into());
        self
    }

    pub fn cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }

    pub fn reactive_delete(mut self) -> Self {
        self.reactive_delete = true;
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    pub fn minimum_size(mut self, size: usize) -> Self {
        self.minimum_size = Some(size);
        self
    }

    pub fn maximum_size(mut self, size: usize) -> Self {
        self.maximum_size = Some(size);
        self
    }

    pub fn selection<F>(mut self, pick: F) -> Self
    where
        F: Fn(&Model, &str) -> Value + Send + Sync + 'static,
    {
        self.selection = Some(Arc::new(pick));
        self
    }

    pub fn reactive<F>(mut self, from: impl Into<String>, to: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.reactives.push(Reactive {
            from: from.into(),
            to: to.into(),
            compute: Arc::new(compute),
        });
        self
    }

    pub fn on_read(mut self, hook: LifecycleHook) -> Self {
        self.read.push(hook);
        self
    }

    pub fn on_write(mut self, hook: LifecycleHook) -> Self {
        self.write.push(hook);
        self
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind.name())
            .field("required", &self.required)
            .field("unique", &self.unique)
            .field("relation", &self.relation)
            .field("read", &self.read.len())
            .field("write", &self.write.len())
            .field("reactives", &self.reactives)
            .finish()
    }
}
