//! LanShare Daemon
//!
//! Local-network file sharing with live browser updates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use daemon::config::{default_config_path, Config};
use daemon::events::ChangeBus;
use daemon::files::{FileTree, Sandbox};
use daemon::router::Router;
use daemon::server::Server;

/// LanShare daemon - share one folder on the local network.
#[derive(Parser, Debug)]
#[command(name = "lanshare")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the LanShare daemon
    Start {
        /// Directory to share (overrides the configured root)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Port to listen on (overrides the configured port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file if none exists
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing; --verbose wins over the configured level
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Start { root, port } => {
            if let Some(root) = root {
                config.share.root_dir = root;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            run(config).await?;
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigCommands::Init => {
                let path = cli.config.unwrap_or_else(default_config_path);
                if path.exists() {
                    println!("Configuration already exists at {}", path.display());
                } else {
                    Config::default().save(&path)?;
                    println!("Wrote default configuration to {}", path.display());
                }
            }
        },
    }

    Ok(())
}

/// Bring the daemon up and serve until SIGINT/SIGTERM.
async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("LanShare daemon starting...");

    let sandbox = Sandbox::open(&config.share.root_dir, config.share.max_depth)?;
    tracing::info!(root = %sandbox.root().display(), max_depth = sandbox.max_depth(), "Sharing directory");

    let bus = ChangeBus::new(config.events.queue_capacity);
    let files = FileTree::new(sandbox, bus.clone());
    let keep_alive = Duration::from_secs(config.events.keep_alive_secs);
    let router = Arc::new(Router::new(files, bus, keep_alive));

    let server = Server::bind(config.socket_addr()?, router).await?;
    let addr = server.local_addr()?;
    tracing::info!("Browse from other devices at http://{}", addr);

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    tracing::info!("LanShare daemon stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}
