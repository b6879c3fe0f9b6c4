//! Local execution via an in-process ReportEngine.

use std::sync::Arc;

use anyhow::{Context, Result};
use budget_query::{executor::Datastore, Config, ReportEngine, SchemaRegistry};

/// Load the schema registry named by the config, or the built-in one.
pub fn load_schema(config: &Config) -> Result<SchemaRegistry> {
    match config.schema_path() {
        Some(path) => SchemaRegistry::from_file(&path)
            .with_context(|| format!("Failed to load schema from {}", path.display())),
        None => Ok(SchemaRegistry::municipal()?),
    }
}

/// Build an engine from the config. The datastore is connected only when
/// `connect` is set.
pub async fn build_engine(config: &Config, connect: bool) -> Result<ReportEngine> {
    let schema = Arc::new(load_schema(config)?);
    let datastore = if connect {
        connect_datastore(config).await?
    } else {
        None
    };
    Ok(ReportEngine::from_config(config, schema, datastore))
}

#[cfg(feature = "postgres")]
async fn connect_datastore(config: &Config) -> Result<Option<Arc<dyn Datastore>>> {
    use budget_query::executor::PgDatastore;

    match config.datastore.resolved_url() {
        Some(url) => {
            let store = PgDatastore::connect(&url, config.datastore.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            Ok(Some(Arc::new(store)))
        }
        None => {
            tracing::warn!("No datastore URL configured (datastore.url or DATABASE_URL)");
            Ok(None)
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn connect_datastore(config: &Config) -> Result<Option<Arc<dyn Datastore>>> {
    if config.datastore.resolved_url().is_some() {
        tracing::warn!("A datastore URL is configured but this build lacks the postgres feature");
    }
    Ok(None)
}
