//! # Subscout Server
//!
//! Runs theHarvester, Amass and subfinder against a domain concurrently and
//! keeps every scan's per-tool results, summary and lifecycle in PostgreSQL.
//!
//! The server is built on Axum and uses:
//! - PostgreSQL for scan records
//! - the enumeration tools as subprocesses, optionally inside a container

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use sqlx::{PgPool, postgres::PgPoolOptions};
use subscout_core::{MIGRATOR, PostgresScanRepository, ScanRepository};
use subscout_model::ScanId;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subscout_server::{
    create_app,
    infra::{
        config::Config,
        startup::{build_app_state, process_executor, reconcile_interrupted_scans},
    },
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "subscout-server")]
#[command(about = "Concurrent subdomain enumeration scans over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to a TOML config file
    #[arg(long, env = "SUBSCOUT_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
    #[command(subcommand)]
    Scans(ScansCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[derive(Debug, Subcommand)]
enum ScansCommand {
    /// Permanently delete a scan record, including soft-deleted ones
    Purge {
        /// Scan id
        id: ScanId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,subscout_core=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_runtime_config(&cli.serve)?;

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&config).await,
        Some(Command::Scans(ScansCommand::Purge { id })) => {
            run_scan_purge(&config, id).await
        }
        None => run_server(config).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut config =
        Config::load(args.config.as_deref()).context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    Ok(config)
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let mut options = PgPoolOptions::new();
    if let Some(max) = config.database.max_connections {
        options = options.max_connections(max);
    }
    options
        .connect(config.database_url()?)
        .await
        .context("failed to connect to PostgreSQL")
}

async fn run_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_scan_purge(config: &Config, id: ScanId) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let repository = PostgresScanRepository::new(pool);
    if repository
        .hard_delete_scan(id)
        .await
        .context("failed to purge scan")?
    {
        info!(scan_id = %id, "Scan purged");
    } else {
        warn!(scan_id = %id, "No scan with that id");
    }
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let pool = connect(&config).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;

    let config = Arc::new(config);
    let repository: Arc<dyn ScanRepository> = Arc::new(PostgresScanRepository::new(pool));
    let state = build_app_state(repository, process_executor(&config), Arc::clone(&config));

    reconcile_interrupted_scans(&state).await?;

    let scan_control = Arc::clone(state.scan_control());
    let router = create_app(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting Subscout Server on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received, cancelling running scans");
    scan_control.shutdown().await;
    info!("Subscout Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
