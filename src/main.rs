//! linesink - TCP line listener
//!
//! Accepts TCP connections, logs every newline-terminated record it
//! receives, and shuts down gracefully on SIGINT/SIGTERM.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linesink::config::{Config, ConfigManager, LoggingConfig};
use linesink::{shutdown, Server};

/// CLI arguments for linesink
#[derive(Parser, Debug)]
#[command(name = "linesink")]
#[command(about = "Accepts TCP connections and logs newline-delimited records")]
#[command(version)]
#[command(long_about = "
linesink - TCP line listener

Accepts TCP connections on the bind address and logs every
newline-terminated record each client sends. Nothing is sent back.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  LINESINK_BIND_ADDR         - Bind address (e.g., :3000, 127.0.0.1:3000)
  LINESINK_MAX_RECORD_SIZE   - Largest accepted record in bytes
  LINESINK_ACCEPT_BACKOFF    - Pause after an accept error (e.g., 50ms)
  LINESINK_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "linesink.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., :3000 or 127.0.0.1:3000)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Largest accepted record in bytes
    #[arg(long, help = "Largest accepted record in bytes")]
    pub max_record_size: Option<usize>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = load_config(&args)?;
    init_tracing(&config.logging, args.verbose);

    info!("Starting linesink v{}", env!("CARGO_PKG_VERSION"));

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  Max record size: {} bytes", config.server.max_record_size);
        info!("  Accept error backoff: {:?}", config.server.accept_error_backoff);
        info!("  Log level: {}", config.logging.level);
        return Ok(());
    }

    let server = Arc::new(Server::new(config.server.clone()));
    info!("Listening for records on {}", server.bind_addr());

    let runner = Arc::clone(&server);
    let mut server_handle = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        // start() only returns on its own when binding failed
        result = &mut server_handle => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("Failed to start server"),
                Err(e) => Err(anyhow!("Server task failed: {}", e)),
            };
        }
        signal = shutdown::listen_for_signals() => {
            if let Err(e) = signal {
                error!("Error setting up signal handlers: {}", e);
            }
        }
    }

    info!("Shutting down gracefully...");
    server.stop();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    let stats = server.stats();
    info!(
        active_connections = stats.active_connections,
        total_connections = stats.total_connections_accepted,
        "Server stopped."
    );

    Ok(())
}

/// Resolve configuration: CLI args > config file > environment > defaults
fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = ConfigManager::load_layered(&args.config)?;

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.log_level.as_deref(),
        args.max_record_size,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    Ok(config)
}

/// Initialize tracing/logging
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let log_level = if verbose { "debug" } else { logging.level.as_str() };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(logging.ansi),
        )
        .with(env_filter)
        .init();
}
