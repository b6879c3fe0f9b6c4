//! REST surface for the report engine.
//!
//! Exposes question answering, intent confirmation and schema listing over
//! HTTP for dashboards and other services.

mod handlers;
mod rest;

pub use handlers::*;
pub use rest::*;
