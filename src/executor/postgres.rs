//! Postgres datastore.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{Datastore, Record};
use crate::builder::{QueryDescriptor, SqlValue};
use crate::error::DatabaseError;

/// Runs descriptors on a Postgres pool.
///
/// Each query is wrapped in `row_to_json` so rows arrive as JSON objects
/// keyed by projection alias, whatever the column types.
#[derive(Debug, Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(classify)?;
        tracing::info!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<Vec<Record>, DatabaseError> {
        let (sql, params) = descriptor.to_sql();
        let wrapped = format!("SELECT row_to_json(q) FROM ({}) q", sql);

        let mut query = sqlx::query_scalar::<_, Value>(&wrapped);
        for param in params {
            query = match param {
                SqlValue::Integer(i) => query.bind(i),
                SqlValue::Decimal(d) => query.bind(d),
                SqlValue::Text(s) => query.bind(s),
            };
        }

        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
        rows.into_iter()
            .map(|row| match row {
                Value::Object(record) => Ok(record),
                other => Err(DatabaseError::Query(format!("unexpected row shape: {}", other))),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

/// Connection-level failures are transient; everything else is not.
fn classify(error: sqlx::Error) -> DatabaseError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DatabaseError::Connection(error.to_string()),
        _ => DatabaseError::Query(error.to_string()),
    }
}
