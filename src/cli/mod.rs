//! CLI module for the budget-query command-line interface.
//!
//! Command handlers run the report engine either in-process or against a
//! remote REST server.

mod commands;
mod local;
mod output;
mod remote;

pub use commands::*;
pub use local::build_engine;
