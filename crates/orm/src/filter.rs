//! Per-field query constraints
//!
//! A [`FilterField`] is a set of optional comparators; every comparator
//! present must hold for a candidate value to match (logical AND). On the
//! wire a bare, non-object value is shorthand for `eq`.

use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

const OPERATOR_KEYS: [&str; 9] = [
    "lte", "lt", "gte", "gt", "eq", "not", "in", "not_in", "inc",
];

/// Comparator set for one filtered field. Absent keys mean no constraint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Value>,
    #[serde(rename = "in", skip_serializing_if = "Option::is_none")]
    pub is_in: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inc: Option<Value>,
}

impl FilterField {
    pub fn eq(mut self, value: Value) -> Self {
        self.eq = Some(value);
        self
    }

    pub fn not(mut self, value: Value) -> Self {
        self.not = Some(value);
        self
    }

    pub fn lte(mut self, value: Value) -> Self {
        self.lte = Some(value);
        self
    }

    pub fn lt(mut self, value: Value) -> Self {
        self.lt = Some(value);
        self
    }

    pub fn gte(mut self, value: Value) -> Self {
        self.gte = Some(value);
        self
    }

    pub fn gt(mut self, value: Value) -> Self {
        self.gt = Some(value);
        self
    }

    pub fn is_in(mut self, values: Vec<Value>) -> Self {
        self.is_in = Some(values);
        self
    }

    pub fn not_in(mut self, values: Vec<Value>) -> Self {
        self.not_in = Some(values);
        self
    }

    pub fn inc(mut self, value: Value) -> Self {
        self.inc = Some(value);
        self
    }

    /// Evaluate the constraint against a candidate value. Every comparator
    /// present must hold.
    pub fn matches(&self, candidate: &Value) -> bool {
        if let Some(expected) = &self.eq {
            if candidate != expected {
                return false;
            }
        }
        if let Some(expected) = &self.not {
            if candidate == expected {
                return false;
            }
        }
        if let Some(bound) = &self.lte {
            if !matches!(compare(candidate, bound), Some(Ordering::Less | Ordering::Equal)) {
                return false;
            }
        }
        if let Some(bound) = &self.lt {
            if !matches!(compare(candidate, bound), Some(Ordering::Less)) {
                return false;
            }
        }
        if let Some(bound) = &self.gte {
            if !matches!(
                compare(candidate, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ) {
                return false;
            }
        }
        if let Some(bound) = &self.gt {
            if !matches!(compare(candidate, bound), Some(Ordering::Greater)) {
                return false;
            }
        }
        if let Some(choices) = &self.is_in {
            if !choices.contains(candidate) {
                return false;
            }
        }
        if let Some(choices) = &self.not_in {
            if choices.contains(candidate) {
                return false;
            }
        }
        if let Some(needle) = &self.inc {
            if !includes(candidate, needle) {
                return false;
            }
        }
        true
    }
}

/// Evaluate a whole filter map against a row object. Missing row fields
/// are matched as `null`.
pub fn matches_row(
    filter: &std::collections::HashMap<String, FilterField>,
    row: &Value,
) -> bool {
    filter.iter().all(|(field, constraint)| {
        let candidate = row.get(field).unwrap_or(&Value::Null);
        constraint.matches(candidate)
    })
}

/// Order two values when they are comparable: numbers numerically,
/// strings lexicographically.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

/// `inc` semantics: array contains the needle, or string contains the substring.
fn includes(candidate: &Value, needle: &Value) -> bool {
    match candidate {
        Value::Array(items) => items.contains(needle),
        Value::String(haystack) => needle
            .as_str()
            .map(|n| haystack.contains(n))
            .unwrap_or(false),
        _ => false,
    }
}

impl<'de> Deserialize<'de> for FilterField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        let mut filter = FilterField::default();

        let obj = match &raw {
            Value::Object(map) if map.keys().any(|k| OPERATOR_KEYS.contains(&k.as_str())) => map,
            // Bare value shorthand: `{"age": 21}` means `{"age": {"eq": 21}}`.
            _ => {
                filter.eq = Some(raw);
                return Ok(filter);
            }
        };

        for (key, value) in obj {
            match key.as_str() {
                "lte" => filter.lte = Some(value.clone()),
                "lt" => filter.lt = Some(value.clone()),
                "gte" => filter.gte = Some(value.clone()),
                "gt" => filter.gt = Some(value.clone()),
                "eq" => filter.eq = Some(value.clone()),
                "not" => filter.not = Some(value.clone()),
                "in" => {
                    filter.is_in =
                        Some(serde_json::from_value(value.clone()).map_err(DeError::custom)?)
                }
                "not_in" => {
                    filter.not_in =
                        Some(serde_json::from_value(value.clone()).map_err(DeError::custom)?)
                }
                "inc" => filter.inc = Some(value.clone()),
                other => {
                    return Err(DeError::custom(format!("unknown filter operator: {}", other)))
                }
            }
        }
        Ok(filter)
    }
}
