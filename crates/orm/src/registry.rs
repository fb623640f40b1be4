//! Process-wide model registry
//!
//! Written at model-construction time, read by every run. Reads take a
//! short read lock and clone the `Arc`, so concurrent dispatches never
//! contend with each other.

use crate::model::Model;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static MODELS: Lazy<RwLock<HashMap<String, Arc<Model>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a resolved model under its name. Re-registering replaces the
/// previous entry; registration is a startup concern, so a replacement
/// outside tests is worth a warning.
pub fn register(model: Arc<Model>) {
    let mut models = match MODELS.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if models.insert(model.name.clone(), model.clone()).is_some() {
        tracing::warn!(model = %model.name, "model re-registered, replacing previous definition");
    }
}

/// Look up a model by name.
pub fn get(name: &str) -> Option<Arc<Model>> {
    let models = match MODELS.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    models.get(name).cloned()
}

/// Snapshot of every registered model; used to discover relation edges
/// when cascading deletes.
pub fn snapshot() -> Vec<Arc<Model>> {
    let models = match MODELS.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    models.values().cloned().collect()
}
