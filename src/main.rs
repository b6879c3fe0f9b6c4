//! budget-query entry point

use std::net::SocketAddr;
use std::sync::Arc;

use budget_query::{api, Config};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

/// budget-query: natural-language reports over municipal budget data
#[derive(Parser, Debug)]
#[command(name = "budget-query")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Send requests to a running REST server (e.g. http://localhost:8080/api/v1)
    #[arg(short, long, global = true, env = "BUDGET_QUERY_REMOTE")]
    remote: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question end to end
    Ask {
        /// The question, e.g. "כמה פרויקטים פעילים יש"
        query: String,
        /// Execute low-confidence interpretations without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the structured intent for a question
    Parse {
        /// The question
        query: String,
    },
    /// Print the SQL and parameters a question compiles to
    Sql {
        /// The question
        query: String,
    },
    /// List report domains
    Domains,
    /// Run the REST server
    Serve {
        /// HTTP port. If not specified, uses config file value.
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable JSON logging format
        #[arg(long)]
        json_logs: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !matches!(args.command, Command::Serve { .. }) {
        // Minimal logging for one-shot commands
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::stderr)
            .init();
    }

    let load_config = || -> anyhow::Result<Config> {
        Ok(match &args.config {
            Some(path) => Config::from_file(path)?,
            None => Config::load()?,
        })
    };

    let mode = match &args.remote {
        Some(url) => cli::ExecutionMode::Remote(url.clone()),
        None => cli::ExecutionMode::Local(Box::new(load_config()?)),
    };

    match args.command {
        Command::Ask { query, yes } => cli::run_ask(mode, query, yes, args.json).await,
        Command::Parse { query } => cli::run_parse(mode, query, args.json).await,
        Command::Sql { query } => cli::run_sql(mode, query, args.json).await,
        Command::Domains => cli::run_domains(mode, args.json).await,
        Command::Serve { port, json_logs } => {
            init_server_logging(json_logs);
            let config = match mode {
                cli::ExecutionMode::Local(config) => *config,
                cli::ExecutionMode::Remote(_) => load_config()?,
            };
            run_server(config, port).await
        }
    }
}

fn init_server_logging(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Run the REST server until Ctrl-C.
async fn run_server(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("Starting budget-query v{}", env!("CARGO_PKG_VERSION"));

    if let Some(p) = port {
        config.server.http_port = p;
    }

    let engine = Arc::new(cli::build_engine(&config, true).await?);
    tracing::info!(
        domains = engine.schema().domains().len(),
        datastore = engine.datastore_name().unwrap_or("none"),
        model = engine.parser().has_model(),
        "Report engine ready"
    );

    let shutdown = CancellationToken::new();
    let app = api::create_rest_router_with_shutdown(
        engine,
        &api::RestApiConfig::from(&config.server),
        shutdown.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    tracing::info!(
        "Listening on http://{}{}",
        addr,
        config.server.prefix
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
            }
            shutdown.cancel();
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
