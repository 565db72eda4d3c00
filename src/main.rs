// src/main.rs - Console entry point
use clap::Parser;
use reachy_console::Console;
use reachy_console::backend;
use reachy_console::config::{self, Config, TransportMode};
use reachy_console::macros::FileStorage;
use reachy_console::web::app_with_state;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "reachy.toml";

/// Reachy teleoperation and choreography console
#[derive(Parser, Debug)]
#[command(name = "reachy-console", about = "Live view, macro recording and playback for Reachy.")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Transport override: auto, http, proxy or sim
    #[arg(short, long)]
    transport: Option<TransportMode>,

    /// Listen address override for the operator API
    #[arg(short, long)]
    listen: Option<String>,
}

fn load(path: &Path) -> Result<Config, config::ConfigError> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(Config::default());
    }
    config::load_config(&path.to_string_lossy())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let mut config = load(&cli.config).map_err(|e| {
        eprintln!("Failed to load config from '{}': {}", cli.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if let Some(mode) = cli.transport {
        config.transport.mode = mode;
    }
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Reachy console");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if cli.config.exists() {
        tracing::info!("Configuration loaded from {}", cli.config.display());
    } else {
        tracing::info!("No configuration file, using defaults");
    }

    let table = Arc::new(config.kinematic_table()?);
    let robot = backend::connect(&config, table).await;
    tracing::info!("Transport: {}", robot.kind());

    let storage = Arc::new(FileStorage::new(&config.storage.dir));
    let listen = config.server.listen.clone();
    let console = Arc::new(Console::new(config, robot, storage).await?);
    console.start_feed().await;

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!("Operator API listening on {}", listener.local_addr()?);

    axum::serve(listener, app_with_state(console.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    console.shutdown().await;
    Ok(())
}
