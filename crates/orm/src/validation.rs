//! Field-constraint validation
//!
//! Runs after the model-level modify/role/rule stages and before any
//! value is persisted: type checks, required/bounds/size constraints,
//! and uniqueness probes through the model's adapter.

use crate::database::Operation;
use crate::error::{OrmError, OrmResult};
use crate::filter::{matches_row, FilterField};
use crate::model::Model;
use crate::payload::Method;
use fookie_validation::{ValidationError, ValidationErrors};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Check every body field against its descriptor. With `partial` set
/// (updates), missing required fields are fine; present values are still
/// fully checked. Explicit nulls clear a value and skip type/bounds
/// checks.
pub(crate) fn check_fields(
    model: &Model,
    body: &Map<String, Value>,
    partial: bool,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (name, value) in body {
        let field = match model.field(name) {
            Some(field) => field,
            None => {
                errors.add(ValidationError::with_code(
                    name.clone(),
                    "unknown field",
                    "unknown_field",
                ));
                continue;
            }
        };

        if value.is_null() {
            continue;
        }

        if !field.kind.check(value) {
            errors.add(ValidationError::with_code(
                name.clone(),
                format!("must be a valid {}", field.kind.name()),
                "invalid_type",
            ));
            continue;
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = field.minimum {
                if number < min {
                    errors.add_error(name.clone(), format!("must be at least {}", min));
                }
            }
            if let Some(max) = field.maximum {
                if number > max {
                    errors.add_error(name.clone(), format!("must be at most {}", max));
                }
            }
        }

        if let Some(size) = value_size(value) {
            if let Some(min) = field.minimum_size {
                if size < min {
                    errors.add_error(name.clone(), format!("must have at least {} items", min));
                }
            }
            if let Some(max) = field.maximum_size {
                if size > max {
                    errors.add_error(name.clone(), format!("must have at most {} items", max));
                }
            }
        }
    }

    if !partial {
        for (name, field) in &model.schema {
            if field.required && !body.contains_key(name) {
                errors.add(ValidationError::with_code(
                    name.clone(),
                    "is required",
                    "required",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn value_size(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Probe the adapter for uniqueness violations on `unique` fields and
/// `unique_group` composites. `exclude` carries the update's own filter
/// so a row keeping its current value is not its own conflict.
pub(crate) async fn check_unique(
    model: &Model,
    body: &Map<String, Value>,
    exclude: Option<&HashMap<String, FilterField>>,
) -> OrmResult<()> {
    let present = |key: &str| body.get(key).map(|v| !v.is_null()).unwrap_or(false);

    // An update writes the same body to every row its filter matches, so a
    // unique value may only be written when the filter matches at most one
    // row. Otherwise the write itself would mint duplicates.
    if let Some(own_filter) = exclude {
        let touches_unique = model.schema.iter().any(|(name, field)| {
            (field.unique && present(name))
                || (!field.unique_group.is_empty()
                    && present(name)
                    && field.unique_group.iter().all(|m| present(m)))
        });
        if touches_unique && count_matching(model, own_filter).await? > 1 {
            return Err(OrmError::Validation(
                "cannot update a unique field on more than one row at once".into(),
            ));
        }
    }

    for (name, field) in &model.schema {
        if field.unique && present(name) {
            let mut filter = HashMap::new();
            filter.insert(name.clone(), FilterField::default().eq(body[name].clone()));
            if conflict_exists(model, filter, exclude).await? {
                return Err(OrmError::Validation(format!("{}: must be unique", name)));
            }
        }

        if !field.unique_group.is_empty() {
            let mut members: Vec<&str> = vec![name.as_str()];
            members.extend(field.unique_group.iter().map(String::as_str));
            if !members.iter().all(|m| present(m)) {
                continue;
            }
            let filter: HashMap<String, FilterField> = members
                .iter()
                .map(|m| {
                    (
                        m.to_string(),
                        FilterField::default().eq(body[*m].clone()),
                    )
                })
                .collect();
            if conflict_exists(model, filter, exclude).await? {
                return Err(OrmError::Validation(format!(
                    "{}: must be unique together with {}",
                    name,
                    field.unique_group.join(", ")
                )));
            }
        }
    }
    Ok(())
}

async fn count_matching(
    model: &Model,
    filter: &HashMap<String, FilterField>,
) -> OrmResult<u64> {
    let mut op = Operation::new(Method::Count);
    op.filter = filter.clone();
    match model.database.modify(model, op).await? {
        crate::database::OperationResult::Count(n) => Ok(n),
        other => Err(OrmError::Adapter(format!(
            "row-count probe expected a count, got {:?}",
            other
        ))),
    }
}

async fn conflict_exists(
    model: &Model,
    filter: HashMap<String, FilterField>,
    exclude: Option<&HashMap<String, FilterField>>,
) -> OrmResult<bool> {
    let mut op = Operation::new(Method::Read);
    op.filter = filter;
    let rows = match model.database.modify(model, op).await? {
        crate::database::OperationResult::Rows(rows) => rows,
        other => {
            return Err(OrmError::Adapter(format!(
                "uniqueness probe expected rows, got {:?}",
                other
            )))
        }
    };

    let conflict = rows.iter().any(|row| match exclude {
        Some(own_filter) => !matches_row(own_filter, row),
        None => true,
    });
    Ok(conflict)
}
