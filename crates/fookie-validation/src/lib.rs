//! # fookie-validation: value validators for the Fookie model framework
//!
//! Every schema field in Fookie references exactly one [`Validator`], a
//! named pure predicate over a `serde_json::Value`. The built-in set lives
//! in [`types`]; [`custom`] registers user-defined validators.

pub mod error;
pub mod types;
pub mod validator;

pub use error::{ValidationError, ValidationErrors, ValidationResult};
pub use validator::{custom, Validator};
