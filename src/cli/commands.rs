//! CLI command dispatcher.
//!
//! `ask` and `domains` run either in-process or against a remote REST
//! server; `parse` and `sql` always run locally and never touch a datastore.

use anyhow::{bail, Result};
use budget_query::{api::DomainsResponse, Config, ReportOutcome, ReportRequest};
use tokio_util::sync::CancellationToken;

use super::{local, output, remote::RestClient};

/// Execution mode for CLI commands.
#[derive(Clone)]
pub enum ExecutionMode {
    /// Execute in-process
    Local(Box<Config>),
    /// Execute against a running REST server
    Remote(String),
}

/// Run the ask command.
pub async fn run_ask(mode: ExecutionMode, query: String, yes: bool, json_output: bool) -> Result<()> {
    let outcome = match mode {
        ExecutionMode::Local(config) => {
            let engine = local::build_engine(&config, true).await?;
            let token = cancel_on_ctrl_c();

            let outcome = engine
                .run_with_cancel(ReportRequest::text(query), &token)
                .await?;
            match outcome {
                ReportOutcome::NeedsConfirmation { intent, .. } if yes => {
                    engine.confirm(&serde_json::to_value(&intent)?, true).await?
                }
                other => other,
            }
        }
        ExecutionMode::Remote(url) => {
            let client = RestClient::new(&url);
            let outcome = client.ask(&query).await?;
            match outcome {
                ReportOutcome::NeedsConfirmation { intent, .. } if yes => {
                    client.confirm(serde_json::to_value(&intent)?, true).await?
                }
                other => other,
            }
        }
    };
    output::print_outcome(&outcome, json_output);
    Ok(())
}

/// Run the parse command.
pub async fn run_parse(mode: ExecutionMode, query: String, json_output: bool) -> Result<()> {
    let config = local_only(mode, "parse")?;
    let engine = local::build_engine(&config, false).await?;
    let intent = engine.parse(&query).await?;
    output::print_intent(&intent, json_output);
    Ok(())
}

/// Run the sql command.
pub async fn run_sql(mode: ExecutionMode, query: String, json_output: bool) -> Result<()> {
    let config = local_only(mode, "sql")?;
    let engine = local::build_engine(&config, false).await?;
    let intent = engine.parse(&query).await?;
    let (sql, params) = engine.compile(&intent)?.to_sql();
    output::print_sql(&intent, &sql, &params, json_output);
    Ok(())
}

/// Run the domains command.
pub async fn run_domains(mode: ExecutionMode, json_output: bool) -> Result<()> {
    let result: DomainsResponse = match mode {
        ExecutionMode::Local(config) => DomainsResponse::from_schema(&local::load_schema(&config)?),
        ExecutionMode::Remote(url) => RestClient::new(&url).domains().await?,
    };
    output::print_domains(&result, json_output);
    Ok(())
}

fn local_only(mode: ExecutionMode, command: &str) -> Result<Box<Config>> {
    match mode {
        ExecutionMode::Local(config) => Ok(config),
        ExecutionMode::Remote(_) => bail!("The {} command runs locally only", command),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}
