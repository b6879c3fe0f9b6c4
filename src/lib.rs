//! budget-query: natural-language reports over municipal budget data
//!
//! A two-stage engine. Stage one turns a free-text question (mostly Hebrew)
//! into a schema-constrained [`Intent`]; stage two compiles that intent into
//! a parameterized SQL query, runs it and shapes the rows for display.
//!
//! ```text
//! IntentParser → IntentValidator → QueryBuilder → QueryExecutor → ResultFormatter
//! ```

pub mod api;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod intent;
pub mod parser;
pub mod schema;
pub mod validator;

pub use api::{create_rest_router, ApiState, RestApiConfig};
pub use builder::{QueryBuilder, QueryDescriptor};
pub use config::Config;
pub use engine::{ReportEngine, ReportOutcome, ReportRequest};
pub use error::{DatabaseError, ReportError, Result, ValidationError};
pub use executor::{Datastore, QueryExecutor, Record, StaticDatastore};
pub use formatter::{QueryResult, ResultFormatter};
pub use intent::{Action, FilterValue, Filters, Intent, IntentSource};
pub use parser::{ChatCompletionModel, IntentModel, IntentParser};
pub use schema::{Domain, Field, FieldType, SchemaRegistry};
pub use validator::{IntentValidator, ValidationReport};
