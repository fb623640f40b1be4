//! Error types for the model core
//!
//! Every pipeline abort maps to one variant here before it is rendered
//! into a `{status: false, error}` response.

use fookie_validation::ValidationErrors;
use std::fmt;

/// Result type alias for model operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for lifecycle and adapter operations
#[derive(Debug, Clone)]
pub enum OrmError {
    /// A field failed its validator or a constraint (required, unique, bounds)
    Validation(String),
    /// A preRule stage rejected the payload
    Precondition(String),
    /// A role stage rejected the payload
    Forbidden(String),
    /// A rule stage rejected the payload
    Rule(String),
    /// The database adapter failed
    Adapter(String),
    /// Unknown model, unbound method, or conflicting schema keys
    Configuration(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// The run exceeded its caller-supplied timeout before the adapter call
    Timeout(String),
    /// The caller cancelled the run between stages
    Cancelled,
    /// A cascading payload exceeded the todo depth guard
    DepthExceeded(usize),
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::Validation(msg) => write!(f, "Validation error: {}", msg),
            OrmError::Precondition(msg) => write!(f, "Precondition failed: {}", msg),
            OrmError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            OrmError::Rule(msg) => write!(f, "Rule violation: {}", msg),
            OrmError::Adapter(msg) => write!(f, "Adapter error: {}", msg),
            OrmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            OrmError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OrmError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            OrmError::Cancelled => write!(f, "Run cancelled by caller"),
            OrmError::DepthExceeded(depth) => {
                write!(f, "Cascading payload exceeded max depth {}", depth)
            }
        }
    }
}

impl std::error::Error for OrmError {}

impl From<ValidationErrors> for OrmError {
    fn from(errors: ValidationErrors) -> Self {
        OrmError::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
