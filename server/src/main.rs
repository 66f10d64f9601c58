use anyhow::{Context, Result};
use clap::Parser;
use cortex_server::config::Config;
use cortex_server::setup::{ensure_database_directory, initialize_app, spawn_lock_sweeper};
use cortex_server::telemetry::{init_telemetry, log_config_validation, log_startup_info};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "cortex-server")]
#[command(about = "Multi-Agent Coordination Server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Database URL override
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Listen address override
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Root directory for project artifact folders
    #[arg(long, env = "PROJECTS_ROOT")]
    projects_root: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => {
            info!("Loading configuration from file: {}", config_file);
            Config::from_file(config_file)?
        }
        None => Config::from_env()?,
    };

    if let Some(ref database_url) = cli.database_url {
        config.database.url = Some(database_url.clone());
    }
    if let Some(ref listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr.clone();
    }
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(ref projects_root) = cli.projects_root {
        config.projects.root = projects_root.clone();
    }
    config.server.port = cli.port;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli).context("Failed to load configuration")?;

    init_telemetry(&config.logging).context("Failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    ensure_database_directory(&config).context("Failed to create database directory")?;

    // Startup failure (database unreachable) exits non-zero
    let app = match initialize_app(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to initialize application");
            std::process::exit(2);
        }
    };

    let sweeper = spawn_lock_sweeper(app.store.clone(), Arc::clone(&app.locks));

    info!("Coordination server ready on http://{}", config.server_address());

    // Graceful shutdown on SIGTERM / SIGINT
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                    .expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            }
        }

        #[cfg(windows)]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        let _ = shutdown_tx.send(());
    });

    let server_addr = config.server_address();
    let outcome = tokio::select! {
        result = app.server.serve(&server_addr) => {
            match result {
                Ok(()) => {
                    info!("Coordination server shut down cleanly");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "Server error");
                    std::process::exit(3);
                }
            }
        }
        _ = shutdown_rx => {
            info!("Shutdown signal received, stopping server");
            Ok(())
        }
    };

    sweeper.abort();
    outcome
}
