//! Configuration for the budget report engine.

mod settings;

pub use settings::*;
