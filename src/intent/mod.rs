//! Structured query intent produced by stage one of the report engine.

pub mod types;

pub use types::*;
