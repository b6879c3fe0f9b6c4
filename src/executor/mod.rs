//! Stage two, second half: run descriptors against a datastore.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::StaticDatastore;
#[cfg(feature = "postgres")]
pub use postgres::PgDatastore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::builder::QueryDescriptor;
use crate::config::DatastoreConfig;
use crate::error::{DatabaseError, Result};

/// One result row, keyed by projection alias in projection order.
pub type Record = Map<String, Value>;

/// Backend that can run a compiled query.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn fetch(&self, descriptor: &QueryDescriptor) -> std::result::Result<Vec<Record>, DatabaseError>;

    fn name(&self) -> &str;
}

/// Runs descriptors with a per-attempt timeout and retries transient
/// failures.
#[derive(Clone)]
pub struct QueryExecutor {
    datastore: Arc<dyn Datastore>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl QueryExecutor {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            timeout: Duration::from_secs(15),
            max_retries: 1,
            retry_delay: Duration::from_millis(200),
        }
    }

    pub fn from_config(datastore: Arc<dyn Datastore>, config: &DatastoreConfig) -> Self {
        Self::new(datastore)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_retries(config.max_retries)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn datastore_name(&self) -> &str {
        self.datastore.name()
    }

    /// Run a descriptor.
    pub async fn execute(&self, descriptor: &QueryDescriptor) -> Result<Vec<Record>> {
        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(self.timeout, self.datastore.fetch(descriptor)).await;
            let error = match outcome {
                Ok(Ok(rows)) => {
                    debug!(
                        datastore = self.datastore.name(),
                        rows = rows.len(),
                        attempt = attempt + 1,
                        "Query executed"
                    );
                    return Ok(rows);
                }
                Ok(Err(e)) => e,
                Err(_) => DatabaseError::Timeout(self.timeout.as_millis() as u64),
            };

            if !error.is_transient() || attempt >= self.max_retries {
                return Err(error.into());
            }

            attempt += 1;
            warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = self.retry_delay.as_millis() as u64,
                "Query failed, retrying: {}",
                error
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
