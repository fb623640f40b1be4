//! # Prelude
//!
//! Convenient imports for common Fookie functionality.
//!
//! ```rust
//! use fookie::prelude::*;
//! ```

// Dispatch entry points
pub use crate::{run, run_with, RunOptions};

// Model definition
pub use crate::{Field, Method, MethodBindings, Mixin, MixinPosition, Model, Stage, SubPipeline};
pub use fookie_orm::{everybody, hook, mixin};

// Wire types
pub use crate::{FilterField, Payload, Query, Response};

// Lifecycle and adapter seams
pub use crate::{Context, Database, LifecycleFunction, LifecycleHook, MemoryDatabase};
pub use crate::{Operation, OperationResult, OrmError, OrmResult};

// Validators
pub use crate::{custom, types, Validator};

// JSON helper
pub use serde_json::json;

// Common derives
pub use serde::{Deserialize, Serialize};

// Async traits
pub use async_trait::async_trait;
