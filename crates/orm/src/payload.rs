//! Wire types: methods, payloads, and responses
//!
//! A [`Payload`] is one unit of work submitted to the dispatcher; its
//! [`Response`] is populated only after dispatch completes.

use crate::filter::FilterField;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of dispatchable methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Read,
    Update,
    Delete,
    Count,
    Test,
    Sum,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Create => write!(f, "create"),
            Method::Read => write!(f, "read"),
            Method::Update => write!(f, "update"),
            Method::Delete => write!(f, "delete"),
            Method::Count => write!(f, "count"),
            Method::Test => write!(f, "test"),
            Method::Sum => write!(f, "sum"),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Method::Create),
            "read" => Ok(Method::Read),
            "update" => Ok(Method::Update),
            "delete" => Ok(Method::Delete),
            "count" => Ok(Method::Count),
            "test" => Ok(Method::Test),
            "sum" => Ok(Method::Sum),
            _ => Err(format!("Unknown method: {}", s)),
        }
    }
}

/// Query portion of a payload: filter, projection, and paging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filter: HashMap<String, FilterField>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Per-payload options.
///
/// `field` names the field a `sum` targets; the dispatcher also sets it
/// while running per-field read/write hooks and accept/reject lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<u64>,
}

/// The unit of work submitted to [`crate::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Model name, resolved against the process-wide registry at dispatch.
    pub model: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub options: QueryOptions,
    /// Populated only after dispatch completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
}

impl Payload {
    pub fn new(model: impl Into<String>, method: Method) -> Self {
        Self {
            token: None,
            model: model.into(),
            method,
            query: None,
            body: None,
            options: QueryOptions::default(),
            response: None,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.options.field = Some(field.into());
        self
    }

    /// Shorthand for a single equality constraint on the query filter.
    pub fn filter_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.query
            .get_or_insert_with(Query::default)
            .filter
            .insert(field.into(), FilterField::default().eq(value));
        self
    }
}

/// The outcome of a dispatched payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub status: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            status: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_round_trips_through_strings() {
        for name in ["create", "read", "update", "delete", "count", "test", "sum"] {
            let method: Method = name.parse().unwrap();
            assert_eq!(method.to_string(), name);
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!("upsert".parse::<Method>().is_err());
        assert!(serde_json::from_str::<Method>("\"upsert\"").is_err());
    }

    #[test]
    fn payload_deserializes_from_wire_shape() {
        let payload: Payload = serde_json::from_value(json!({
            "model": "user",
            "method": "create",
            "body": {"email": "a@x.com"},
            "token": "abc"
        }))
        .unwrap();

        assert_eq!(payload.model, "user");
        assert_eq!(payload.method, Method::Create);
        assert_eq!(payload.token.as_deref(), Some("abc"));
        assert!(payload.response.is_none());
    }

    #[test]
    fn filter_eq_builds_query() {
        let payload = Payload::new("user", Method::Read).filter_eq("email", json!("a@x.com"));
        let query = payload.query.unwrap();
        assert!(query.filter["email"].matches(&json!("a@x.com")));
        assert!(!query.filter["email"].matches(&json!("b@x.com")));
    }

    #[test]
    fn response_constructors() {
        let ok = Response::success(json!([1, 2]));
        assert!(ok.status);
        assert!(ok.error.is_none());

        let err = Response::failure("nope");
        assert!(!err.status);
        assert_eq!(err.data, Value::Null);
        assert_eq!(err.error.as_deref(), Some("nope"));
    }
}
