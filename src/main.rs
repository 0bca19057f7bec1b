//! Peyk binary: the webhook relay process.
//!
//! `peyk start` wires the collaborators (platform adapters, identity
//! resolver, credential store, AI dispatcher, auditor) into the relay and
//! runs the webhook server until SIGINT/SIGTERM. `peyk check-config`
//! parses and prints the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use peyk::ai::http::HttpAiDispatcher;
use peyk::audit::SqlAuditor;
use peyk::config::{config_dir, load_config, Config};
use peyk::credentials::SqlCredentialStore;
use peyk::gateway::run_gateway;
use peyk::identity::SqlIdentityResolver;
use peyk::logging;
use peyk::platforms::bale::BaleAdapter;
use peyk::platforms::eitaa::EitaaAdapter;
use peyk::relay::Relay;

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "peyk", about = "Multi-tenant school chatbot relay")]
struct Cli {
    /// Path to peyk.toml (default: ~/.peyk/peyk.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook relay.
    Start,
    /// Parse the configuration and print the resolved values.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Operator convenience: RUST_LOG and friends may live in a local .env.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::Start => start(config).await,
        Command::CheckConfig => {
            logging::init_cli();
            println!("{config:#?}");
            Ok(())
        }
    }
}

/// Load the config from the given or default path.
///
/// A missing file at the default path is not an error: every field has a
/// working default and single-box test deployments run without a file.
fn resolve_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default_path = config_dir()?.join("peyk.toml");
            if default_path.exists() {
                load_config(&default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn start(config: Config) -> Result<()> {
    let _logging_guard = logging::init_production(config.logging.dir.as_deref())
        .context("failed to initialise logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "peyk starting");

    let db = open_database(&config).await?;

    let credentials = SqlCredentialStore::new(db.clone());
    credentials
        .probe()
        .await
        .context("credential store unreachable at startup")?;

    let relay = Relay::new(
        Arc::new(BaleAdapter::new(config.platforms.bale.api_base.clone())),
        Arc::new(EitaaAdapter::new(config.platforms.eitaa.api_base.clone())),
        Arc::new(SqlIdentityResolver::new(db.clone())),
        Arc::new(credentials),
        Arc::new(HttpAiDispatcher::new(
            config.ai.endpoint.clone(),
            Duration::from_secs(config.ai.request_timeout_secs),
        )),
        Arc::new(SqlAuditor::new(db)),
    );

    run_gateway(&config.server, relay).await
}

async fn open_database(config: &Config) -> Result<SqlitePool> {
    let url = format!("sqlite:{}", config.database.path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .with_context(|| format!("failed to open database at {}", config.database.path.display()))?;
    info!(path = %config.database.path.display(), "database opened");
    Ok(pool)
}
