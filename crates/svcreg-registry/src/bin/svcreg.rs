use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use svcreg_registry::{RegistryConfig, RegistryServer};

/// svcreg - service registry with heartbeat-based membership
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML); defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RegistryConfig::load_from_file(path)?,
        None => RegistryConfig::default(),
    };

    if let Some(port) = args.port {
        config.registry.port = port;
        config.validate()?;
    }

    initialize_logging(&config, args.debug);

    match &args.config {
        Some(path) => info!("Config file: {}", path),
        None => info!("No config file given, using defaults"),
    }
    info!("Starting svcreg on port {}", config.registry.port);

    RegistryServer::new(config)
        .run(shutdown_signal())
        .await
        .context("Registry server failed")?;

    info!("svcreg shut down");
    Ok(())
}

fn initialize_logging(config: &RegistryConfig, debug: bool) {
    let level = if debug {
        "debug"
    } else {
        config.registry.log_level.as_str()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let sigterm = signal::unix::signal(signal::unix::SignalKind::terminate());
        let sigint = signal::unix::signal(signal::unix::SignalKind::interrupt());

        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM signal"),
                    _ = sigint.recv() => info!("Received SIGINT signal"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl+C signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
