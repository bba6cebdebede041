use std::path::PathBuf;

use axum::extract::FromRef;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod clock;
mod commands;
mod config;
mod controllers;
mod db;
mod error;
mod ids;
mod models;
mod types;

use config::Config;
use db::Database;
pub(crate) use error::AppResult;

/// Self-expiring, view-limited paste service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overriding the config file.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Port to listen on, overriding the config file.
    #[arg(long, global = true, env = "PORT")]
    port: Option<u16>,

    /// Let clients override the clock with the `x-test-now-ms` header.
    #[arg(
        long,
        global = true,
        env = "TEST_MODE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
    )]
    test_mode: Option<bool>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve,
    /// Create the database schema and exit.
    Migrate,
    /// Check that the database is reachable.
    Check,
}

#[derive(Clone, FromRef)]
pub struct App {
    pub config: Config,
    pub database: Database,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(test_mode) = args.test_mode {
        config.test_mode = test_mode;
    }

    let database = Database::connect(&config.database.url, config.database.max_connections).await?;
    let app = App { config, database };

    match args.command {
        Command::Serve => commands::serve::run(app).await,
        Command::Migrate => commands::migrate::run(app).await,
        Command::Check => commands::check::run(app).await,
    }
}
