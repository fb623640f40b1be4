//! # fookie-orm: the lifecycle-driven model core of Fookie
//!
//! Models are named schemas with per-method lifecycle bindings; a single
//! dispatcher ([`run`]) executes payloads against them through a fixed
//! pipeline (preRule → modify → role → rule → filter → effect) and a
//! pluggable [`Database`] adapter.

pub mod backends;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod field;
pub mod filter;
pub mod lifecycle;
pub mod mixin;
pub mod model;
pub mod payload;
pub mod registry;
pub mod state;

mod validation;

// Re-export core traits and types
pub use backends::MemoryDatabase;
pub use database::{Database, Operation, OperationResult};
pub use dispatcher::{run, run_with, RunOptions};
pub use error::{OrmError, OrmResult};
pub use field::{Field, Reactive};
pub use filter::{matches_row, FilterField};
pub use lifecycle::{
    everybody, hook, BindTable, Context, LifecycleFunction, LifecycleHook, LifecycleResult,
    MethodBindings, Stage, SubPipeline,
};
pub use mixin::{mixin, Mixin, MixinPosition};
pub use model::{Model, ModelBuilder};
pub use payload::{Method, Payload, Query, QueryOptions, Response};
pub use state::{Metrics, StageTiming, State};
