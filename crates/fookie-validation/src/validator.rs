//! The validator type and the custom-validator extension point

use serde_json::Value;
use std::sync::Arc;

/// Predicate signature shared by every validator.
pub type CheckFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A named pure predicate over a JSON value.
///
/// Validators never panic and never error; a value either satisfies the
/// predicate or it does not. They are cheap to clone and safe to share
/// across concurrent pipeline runs.
#[derive(Clone)]
pub struct Validator {
    name: String,
    predicate: CheckFn,
}

impl Validator {
    /// Create a validator from a name and a predicate function.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// The validator's registered name, used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate against a value.
    pub fn check(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

/// Register a user-defined validator.
///
/// This is the extension point next to the fixed set in [`crate::types`]:
///
/// ```rust
/// use fookie_validation::custom;
/// use serde_json::json;
///
/// let even = custom("Even", |v| v.as_i64().map(|n| n % 2 == 0).unwrap_or(false));
/// assert!(even.check(&json!(4)));
/// assert!(!even.check(&json!(3)));
/// ```
pub fn custom<F>(name: impl Into<String>, predicate: F) -> Validator
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Validator::new(name, predicate)
}
