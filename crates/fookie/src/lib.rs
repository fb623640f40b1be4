//! # Fookie - lifecycle-driven CRUD models for Rust
//!
//! Fookie models are named schemas plus ordered lifecycle bindings.
//! One generic entry point, [`run`], dispatches every payload — create,
//! read, update, delete, count, test, sum — through the model's pipeline
//! and its database adapter.
//!
//! This is the umbrella package that provides a unified API and
//! convenient imports for the Fookie crates.
//!
//! ```rust
//! use fookie::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let db = Arc::new(MemoryDatabase::new());
//! Model::builder("note", db)
//!     .field("text", Field::new(types::text()).required())
//!     .bind(Method::Create, Stage::Role, everybody())
//!     .expose(Method::Read)
//!     .build()
//!     .unwrap();
//!
//! let created = run(Payload::new("note", Method::Create).body(json!({"text": "hi"}))).await;
//! assert!(created.status);
//! # }
//! ```

// Re-export sub-packages as modules
pub use fookie_orm as orm;
pub use fookie_validation as validation;

// Re-export common types at root level for convenience
pub use fookie_orm::{
    run, run_with, Context, Database, Field, FilterField, LifecycleFunction, LifecycleHook,
    MemoryDatabase, Method, MethodBindings, Mixin, MixinPosition, Model, Operation,
    OperationResult, OrmError, OrmResult, Payload, Query, Response, RunOptions, Stage,
    SubPipeline,
};
pub use fookie_validation::{custom, types, ValidationError, ValidationErrors, Validator};

// Prelude module for convenient imports
pub mod prelude;

/// Current version of Fookie
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework information
pub const FRAMEWORK_NAME: &str = "fookie";

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    FRAMEWORK_NAME
}
