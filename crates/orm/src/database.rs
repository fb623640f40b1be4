//! The storage-facing boundary
//!
//! The dispatcher never touches storage directly; after the pre-database
//! stages have produced a finalized [`Operation`] descriptor it makes
//! exactly one [`Database::modify`] call per payload.

use crate::error::OrmResult;
use crate::filter::FilterField;
use crate::model::Model;
use crate::payload::Method;
use async_trait::async_trait;
use fookie_validation::Validator;
use serde_json::Value;
use std::collections::HashMap;

/// Finalized operation descriptor handed to an adapter.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub method: Option<Method>,
    pub filter: HashMap<String, FilterField>,
    /// Projection; empty means all fields.
    pub attributes: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub body: Option<Value>,
    /// Target field for `sum`.
    pub field: Option<String>,
}

impl Operation {
    pub fn new(method: Method) -> Self {
        Self {
            method: Some(method),
            ..Self::default()
        }
    }
}

/// What an adapter call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// The stored row, including the adapter-assigned primary key.
    Created(Value),
    Rows(Vec<Value>),
    /// Rows touched by an update or delete.
    Affected(u64),
    Count(u64),
    Sum(f64),
}

impl OperationResult {
    /// Collapse into the response `data` value.
    pub fn into_value(self) -> Value {
        match self {
            OperationResult::Created(row) => row,
            OperationResult::Rows(rows) => Value::Array(rows),
            OperationResult::Affected(n) | OperationResult::Count(n) => Value::from(n),
            OperationResult::Sum(s) => Value::from(s),
        }
    }
}

/// External storage binding. Implementations declare their primary-key
/// name and validator; the model builder rejects schemas that shadow the
/// primary key.
#[async_trait]
pub trait Database: Send + Sync {
    /// Primary-key field name reserved by this adapter.
    fn pk(&self) -> &str;

    /// Validator for primary-key values.
    fn pk_type(&self) -> Validator;

    async fn connect(&self) -> OrmResult<()>;

    async fn disconnect(&self) -> OrmResult<()>;

    /// Execute one finalized operation against storage.
    async fn modify(&self, model: &Model, operation: Operation) -> OrmResult<OperationResult>;
}
