//! Database adapter implementations
//!
//! Real deployments plug their own [`crate::database::Database`] impl in;
//! the in-memory adapter here backs tests, demos, and prototyping.

pub mod memory;

pub use memory::MemoryDatabase;
