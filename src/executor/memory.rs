//! In-memory datastore returning canned rows.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Datastore, Record};
use crate::builder::{QueryDescriptor, SqlValue};
use crate::error::DatabaseError;

/// Datastore that answers every query with the same rows.
///
/// Records the last rendered query and can be scripted to fail, which makes
/// it useful for embedding the engine without a database and for tests.
#[derive(Debug, Default)]
pub struct StaticDatastore {
    rows: Vec<Record>,
    failures: Mutex<VecDeque<DatabaseError>>,
    last_query: Mutex<Option<(String, Vec<SqlValue>)>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl StaticDatastore {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Queue a failure for the next call. Failures are consumed in order.
    pub fn with_failure(mut self, error: DatabaseError) -> Self {
        self.failures.get_mut().push_back(error);
        self
    }

    /// Delay every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetch calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// SQL text and parameters of the last fetch.
    pub async fn last_query(&self) -> Option<(String, Vec<SqlValue>)> {
        self.last_query.lock().await.clone()
    }
}

#[async_trait]
impl Datastore for StaticDatastore {
    async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<Vec<Record>, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().await = Some(descriptor.to_sql());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().await.pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.rows.clone()),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}
