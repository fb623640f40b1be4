//! In-memory database adapter
//!
//! Backs tests and prototyping: one dashmap entry per model, rows stored
//! as JSON objects in insertion order, uuid v4 string primary keys.

use crate::database::{Database, Operation, OperationResult};
use crate::error::{OrmError, OrmResult};
use crate::filter::matches_row;
use crate::model::Model;
use crate::payload::Method;
use async_trait::async_trait;
use dashmap::DashMap;
use fookie_validation::{types, Validator};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct MemoryDatabase {
    tables: DashMap<String, Vec<Value>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Number of rows currently stored for a model. Test convenience.
    pub fn len(&self, model: &str) -> usize {
        self.tables.get(model).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, model: &str) -> bool {
        self.len(model) == 0
    }

    fn project(row: &Value, attributes: &[String]) -> Value {
        if attributes.is_empty() {
            return row.clone();
        }
        let mut projected = Map::new();
        if let Some(obj) = row.as_object() {
            for attr in attributes {
                if let Some(value) = obj.get(attr) {
                    projected.insert(attr.clone(), value.clone());
                }
            }
        }
        Value::Object(projected)
    }

    fn body_object(operation: &Operation) -> OrmResult<&Map<String, Value>> {
        operation
            .body
            .as_ref()
            .and_then(|b| b.as_object())
            .ok_or_else(|| OrmError::Adapter("operation body must be a JSON object".into()))
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn pk(&self) -> &str {
        "id"
    }

    fn pk_type(&self) -> Validator {
        types::text()
    }

    async fn connect(&self) -> OrmResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> OrmResult<()> {
        Ok(())
    }

    async fn modify(&self, model: &Model, operation: Operation) -> OrmResult<OperationResult> {
        let method = operation
            .method
            .ok_or_else(|| OrmError::Adapter("operation is missing a method".into()))?;
        let filter: &HashMap<_, _> = &operation.filter;
        let mut table = self.tables.entry(model.name.clone()).or_default();

        match method {
            Method::Create => {
                let mut row = Self::body_object(&operation)?.clone();
                row.insert(self.pk().to_string(), Value::from(uuid::Uuid::new_v4().to_string()));
                let row = Value::Object(row);
                table.push(row.clone());
                Ok(OperationResult::Created(row))
            }
            Method::Read => {
                let rows: Vec<Value> = table
                    .iter()
                    .filter(|row| matches_row(filter, row))
                    .skip(operation.offset.unwrap_or(0))
                    .take(operation.limit.unwrap_or(usize::MAX))
                    .map(|row| Self::project(row, &operation.attributes))
                    .collect();
                Ok(OperationResult::Rows(rows))
            }
            Method::Update => {
                let patch = Self::body_object(&operation)?.clone();
                let mut affected = 0;
                for row in table.iter_mut() {
                    if !matches_row(filter, row) {
                        continue;
                    }
                    if let Some(obj) = row.as_object_mut() {
                        for (key, value) in &patch {
                            obj.insert(key.clone(), value.clone());
                        }
                        affected += 1;
                    }
                }
                Ok(OperationResult::Affected(affected))
            }
            Method::Delete => {
                let before = table.len();
                table.retain(|row| !matches_row(filter, row));
                Ok(OperationResult::Affected((before - table.len()) as u64))
            }
            Method::Count => {
                let count = table.iter().filter(|row| matches_row(filter, row)).count();
                Ok(OperationResult::Count(count as u64))
            }
            Method::Sum => {
                let field = operation
                    .field
                    .as_deref()
                    .ok_or_else(|| OrmError::Adapter("sum requires a target field".into()))?;
                let sum: f64 = table
                    .iter()
                    .filter(|row| matches_row(filter, row))
                    .filter_map(|row| row.get(field).and_then(|v| v.as_f64()))
                    .sum();
                Ok(OperationResult::Sum(sum))
            }
            Method::Test => Err(OrmError::Adapter(
                "test payloads never reach the adapter".into(),
            )),
        }
    }
}
