//! Models: named schemas plus lifecycle binding tables
//!
//! [`Model::builder`] resolves mixins into the model's own declarations
//! and registers the result into the process-wide registry, so payloads
//! can reference it by name.

use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::field::Field;
use crate::lifecycle::{BindTable, LifecycleHook, MethodBindings, Stage, SubPipeline};
use crate::mixin::{Mixin, MixinPosition};
use crate::payload::Method;
use crate::registry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named schema plus lifecycle bindings describing one persisted
/// entity type. Fully resolved: mixins have already been merged in.
pub struct Model {
    pub name: String,
    pub database: Arc<dyn Database>,
    pub schema: HashMap<String, Field>,
    /// Per-method overrides replacing the default adapter-backed operation.
    pub methods: HashMap<Method, LifecycleHook>,
    pub bind: BindTable,
    /// Names of the mixins applied at construction, in application order.
    pub mixins: Vec<String>,
}

impl Model {
    pub fn builder(name: impl Into<String>, database: Arc<dyn Database>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            database,
            schema: HashMap::new(),
            methods: HashMap::new(),
            bind: HashMap::new(),
            mixins: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.schema.get(name)
    }

    pub fn bindings(&self, method: Method) -> Option<&MethodBindings> {
        self.bind.get(&method)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("schema", &self.schema.keys().collect::<Vec<_>>())
            .field("bind", &self.bind.keys().collect::<Vec<_>>())
            .field("mixins", &self.mixins)
            .finish()
    }
}

/// Builder assembling a model from its own declarations and mixins.
pub struct ModelBuilder {
    name: String,
    database: Arc<dyn Database>,
    schema: HashMap<String, Field>,
    methods: HashMap<Method, LifecycleHook>,
    bind: BindTable,
    mixins: Vec<Mixin>,
}

impl ModelBuilder {
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.schema.insert(name.into(), field);
        self
    }

    /// Replace the default adapter-backed operation for a method. The
    /// override must populate the payload response itself.
    pub fn method(mut self, method: Method, hook: LifecycleHook) -> Self {
        self.methods.insert(method, hook);
        self.bind.entry(method).or_default();
        self
    }

    /// Expose a method with no hooks; only bound methods are dispatchable.
    pub fn expose(mut self, method: Method) -> Self {
        self.bind.entry(method).or_default();
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

    pub fn mixin(mut self, mixin: Mixin) -> Self {
        self.mixins.push(mixin);
        self
    }

    /// Resolve mixins, check the schema against the adapter's reserved
    /// primary key, and register the model.
    ///
    /// Schema precedence: Before-mixins < own declarations < After-mixins,
    /// with last-applied-wins between mixins at the same position. Bind
    /// stage lists never overwrite: Before-mixin hooks are prepended, own
    /// hooks sit in the middle, After-mixin hooks are appended, each group
    /// in application order.
    pub fn build(self) -> OrmResult<Arc<Model>> {
        let mut schema: HashMap<String, Field> = HashMap::new();
        let mut bind: BindTable = HashMap::new();

        let (before, after): (Vec<&Mixin>, Vec<&Mixin>) = self
            .mixins
            .iter()
            .partition(|m| m.position == MixinPosition::Before);

        for m in &before {
            schema.extend(m.schema.clone());
            merge_bind(&mut bind, &m.bind);
        }

        schema.extend(self.schema);
        merge_bind(&mut bind, &self.bind);

        for m in &after {
            schema.extend(m.schema.clone());
            merge_bind(&mut bind, &m.bind);
        }

        let pk = self.database.pk();
        if schema.contains_key(pk) {
            return Err(OrmError::Configuration(format!(
                "schema key '{}' conflicts with the adapter primary key on model '{}'",
                pk, self.name
            )));
        }

        let model = Arc::new(Model {
            name: self.name,
            database: self.database,
            schema,
            methods: self.methods,
            bind,
            mixins: self.mixins.iter().map(|m| m.name.clone()).collect(),
        });
        registry::register(model.clone());
        Ok(model)
    }
}

fn merge_bind(into: &mut BindTable, from: &BindTable) {
    for (method, bindings) in from {
        into.entry(*method).or_default().append(bindings);
    }
}
